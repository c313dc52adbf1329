//! Field text helpers: HTML stripping and the duplicate-detection checksum.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use sha1::{Digest, Sha1};

static IMG_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?si)<img[^>]+src=["']?([^"'>]+)["']?[^>]*>"#).expect("img pattern")
});
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("comment pattern"));
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<.*?>").expect("tag pattern"));
static ENTITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z][a-zA-Z0-9]{1,7});").expect("entity pattern")
});

/// Remove markup and decode entities. Whitespace is left as is.
pub fn strip_html(html: &str) -> String {
    let without_comments = COMMENT.replace_all(html, "");
    let text = TAG.replace_all(&without_comments, "");
    decode_entities(&text).into_owned()
}

/// Like [`strip_html`], but `<img>` tags leave their filename behind.
pub fn strip_html_preserving_media_filenames(html: &str) -> String {
    let with_names = IMG_TAG.replace_all(html, " ${1} ");
    strip_html(&with_names)
}

/// Decode named and numeric character references; unknown names are kept.
pub fn decode_entities(text: &str) -> Cow<'_, str> {
    if !text.contains('&') {
        return Cow::Borrowed(text);
    }
    ENTITY.replace_all(text, |caps: &Captures| {
        let body = &caps[1];
        let decoded = if let Some(num) = body.strip_prefix('#') {
            let code = match num.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => num.parse().ok(),
            };
            code.and_then(char::from_u32)
        } else {
            named_entity(body)
        };
        match decoded {
            Some(c) => c.to_string(),
            None => caps[0].to_string(),
        }
    })
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "hellip" => '\u{2026}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "deg" => '\u{b0}',
        "times" => '\u{d7}',
        "divide" => '\u{f7}',
        "laquo" => '\u{ab}',
        "raquo" => '\u{bb}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        _ => return None,
    })
}

/// Anki's `csum`: the first 32 bits of the SHA-1 of the stripped first field.
pub fn field_checksum(first_field: &str) -> u32 {
    let stripped = strip_html_preserving_media_filenames(first_field);
    let digest = Sha1::digest(stripped.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

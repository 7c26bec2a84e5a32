//! Hyperlink detection in free-form QR text.

use reqwest::Url;

/// Link openings recognized anywhere inside a token, with the scheme implied
/// by a bare `www.` host.
const LINK_STARTS: &[(&str, &str)] = &[
    ("https://", ""),
    ("http://", ""),
    ("ftp://", ""),
    ("mailto:", ""),
    ("www.", "http://"),
];

/// Characters that commonly wrap a bare e-mail address in prose.
const TRIM_CHARS: &[char] = &[
    '(', ')', '[', ']', '{', '}', '<', '>', '"', '\'', ',', '.', ';', ':', '!', '?', '「', '」', '。', '、',
];

/// Punctuation dropped from the end of a link candidate. `)` is handled
/// separately so balanced parentheses survive.
const TRAILING_CHARS: &[char] = &['.', ',', ':', '!', '?', '\'', ']', '}'];

/// Returns every link found in `text`, in order of appearance.
///
/// Recognizes absolute URLs with a web scheme, `www.` hosts (treated as
/// `http://`) and bare e-mail addresses (treated as `mailto:`). Links may sit
/// inside a longer run of text such as `URL:https://...;;` or prose without
/// spaces. A link ends at whitespace, non-ASCII text, `;` (the field
/// separator of MECARD-style payloads) or a character that cannot appear
/// unescaped in a URL.
pub fn extract_links(text: &str) -> Vec<Url> {
    let mut links = Vec::new();
    for token in text.split_whitespace() {
        let before = links.len();
        scan_token(token, &mut links);
        if links.len() == before {
            let bare = token.trim_matches(TRIM_CHARS);
            if is_email(bare) {
                links.extend(Url::parse(&format!("mailto:{}", bare)).ok());
            }
        }
    }
    links
}

fn scan_token(token: &str, links: &mut Vec<Url>) {
    let mut resume_at = 0;
    for (at, _) in token.char_indices() {
        if at < resume_at {
            continue;
        }
        let Some((prefix, implied)) = link_start(token, at) else {
            continue;
        };
        let rest = &token[at..];
        let end = rest.find(|c: char| !is_link_char(c)).unwrap_or(rest.len());
        let candidate = trim_trailing(&rest[..end]);
        if candidate.len() <= prefix.len() {
            continue;
        }
        if let Some(url) = Url::parse(&format!("{}{}", implied, candidate))
            .ok()
            .filter(has_host_or_path)
        {
            links.push(url);
            resume_at = at + end;
        }
    }
}

/// A link may open at `at` unless it continues an ASCII word (`xhttp://`, `awww.`).
fn link_start(token: &str, at: usize) -> Option<(&'static str, &'static str)> {
    if token[..at]
        .chars()
        .next_back()
        .is_some_and(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    let rest = &token[at..];
    LINK_STARTS
        .iter()
        .find(|(prefix, _)| {
            rest.get(..prefix.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        })
        .copied()
}

fn is_link_char(c: char) -> bool {
    c.is_ascii_graphic() && !matches!(c, '"' | '<' | '>' | '`' | '{' | '|' | '\\' | '^' | ';')
}

fn trim_trailing(mut candidate: &str) -> &str {
    while let Some(last) = candidate.chars().next_back() {
        let unbalanced_close =
            last == ')' && candidate.matches('(').count() < candidate.matches(')').count();
        if !(TRAILING_CHARS.contains(&last) || unbalanced_close) {
            break;
        }
        candidate = &candidate[..candidate.len() - last.len_utf8()];
    }
    candidate
}

fn has_host_or_path(url: &Url) -> bool {
    match url.scheme() {
        "mailto" => !url.path().is_empty(),
        _ => url.host_str().is_some_and(|h| !h.is_empty()),
    }
}

fn is_email(token: &str) -> bool {
    let Some((local, domain)) = token.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'))
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

use itertools::Itertools;

/// Suffixes appended to every name variant when searching for footage.
pub const QUERY_SUFFIXES: [&str; 6] = [
    "gameplay",
    "walkthrough",
    "review",
    "boss fight",
    "ps5 gameplay",
    "pc gameplay",
];

/// URL-safe slug: lowercase, runs of anything that is not a letter or digit
/// collapse to a single `-`, no leading/trailing dashes.
pub fn slugify(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

fn collapse_ws(input: &str) -> String {
    input.split_whitespace().join(" ")
}

/// Name with everything but ASCII letters, digits and spaces blanked out.
pub fn ascii_clean(name: &str) -> String {
    let blanked: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == ' ' { c } else { ' ' })
        .collect();
    collapse_ws(&blanked)
}

/// Name with common title separators (dashes, colons, ampersands) turned into spaces.
pub fn spaced(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '-' | '–' | '—' | ':' | '&' => ' ',
            other => other,
        })
        .collect();
    collapse_ws(&replaced)
}

/// Ordered, de-duplicated search queries for a game's gameplay footage.
///
/// Variants: the raw name, [`ascii_clean`], [`spaced`]; each crossed with
/// [`QUERY_SUFFIXES`] so the most literal query comes first.
pub fn search_queries(game_name: &str) -> Vec<String> {
    let raw = collapse_ws(game_name);
    [raw, ascii_clean(game_name), spaced(game_name)]
        .into_iter()
        .filter(|b| !b.is_empty())
        .unique()
        .flat_map(|base| {
            QUERY_SUFFIXES
                .iter()
                .map(move |suffix| format!("{base} {suffix}"))
        })
        .unique()
        .collect()
}

/// Three `%..%` LIKE patterns (name, dash-spaced slug, ASCII-clean name),
/// padded by repeating the last one so callers can bind a fixed arity.
pub fn like_patterns(name: &str, slug: &str) -> [String; 3] {
    let mut parts: Vec<String> = [
        name.trim().to_string(),
        slug.trim().replace('-', " "),
        ascii_clean(name),
    ]
    .into_iter()
    .filter(|p| !p.is_empty())
    .unique()
    .take(3)
    .collect();
    if parts.is_empty() {
        parts.push(String::new());
    }
    while parts.len() < 3 {
        let last = parts[parts.len() - 1].clone();
        parts.push(last);
    }
    [
        format!("%{}%", parts[0]),
        format!("%{}%", parts[1]),
        format!("%{}%", parts[2]),
    ]
}

//! String normalization shared by the column reconciler and name resolution.

/// Lowercase and strip Spanish diacritics.
pub fn fold(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ñ' => 'n',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Canonical snake_case for a column header.
///
/// Every run of characters that is not an ASCII letter or digit becomes a
/// single `_`, so `"Clip Start"`, `"clip-start"` and `"inicio_golpe:_x"`
/// land on `clip_start` and `inicio_golpe_x`.
pub fn snake_case(header: &str) -> String {
    let folded = fold(header.trim().trim_start_matches('\u{feff}'));
    let mut out = String::with_capacity(folded.len());
    let mut pending_sep = false;
    for c in folded.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Folded, whitespace-collapsed form of a person name with dots removed
/// (`"F.  Chingotto"` → `"f chingotto"`).
pub fn name_key(name: &str) -> String {
    fold(name)
        .replace('.', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

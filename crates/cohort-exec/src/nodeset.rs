//! Minimal node-set expression expansion: comma-separated names and
//! ClusterShell-style `prefix[a-b]`/`prefix[a,b,c]` ranges. The engine core
//! treats the target string as opaque; this is the local executor's own
//! reading of it.

/// Expand a node-set expression into the literal node names it denotes.
///
/// `"localhost"` and bare comma lists pass through unchanged; a bracketed
/// group expands each entry against the surrounding prefix/suffix. A
/// malformed bracket group (unbalanced, non-numeric non-literal entries) is
/// not rejected -- it falls back to the literal token, since this executor
/// targets independent local processes and has no remote topology to
/// validate against.
pub fn expand(expr: &str) -> Vec<String> {
    split_top_level(expr).into_iter().flat_map(expand_token).collect()
}

fn split_top_level(s: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts.into_iter().map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn expand_token(token: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (token.find('['), token.rfind(']')) else {
        return vec![token.to_string()];
    };
    if close < open {
        return vec![token.to_string()];
    }

    let prefix = &token[..open];
    let inner = &token[open + 1..close];
    let suffix = &token[close + 1..];

    let mut out = Vec::new();
    for piece in inner.split(',') {
        let piece = piece.trim();
        if let Some((lo, hi)) = piece.split_once('-') {
            if let (Ok(lo), Ok(hi)) = (lo.trim().parse::<u32>(), hi.trim().parse::<u32>()) {
                for n in lo..=hi {
                    out.push(format!("{prefix}{n}{suffix}"));
                }
                continue;
            }
        }
        out.push(format!("{prefix}{piece}{suffix}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_passes_through() {
        assert_eq!(expand("localhost"), vec!["localhost".to_string()]);
    }

    #[test]
    fn comma_list() {
        assert_eq!(expand("a,b,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn bracket_range() {
        assert_eq!(expand("node[1-4]"), vec!["node1", "node2", "node3", "node4"]);
    }

    #[test]
    fn bracket_list() {
        assert_eq!(expand("node[1,3,5]"), vec!["node1", "node3", "node5"]);
    }

    #[test]
    fn mixed_comma_and_bracket() {
        assert_eq!(expand("head,node[1-2]"), vec!["head", "node1", "node2"]);
    }

    #[test]
    fn malformed_bracket_falls_back_to_literal() {
        assert_eq!(expand("node[a-b-c"), vec!["node[a-b-c".to_string()]);
    }
}

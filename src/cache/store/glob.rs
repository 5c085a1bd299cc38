/// Redis `MATCH` pattern semantics: `*`, `?`, `[abc]`, `[^abc]`, `[a-z]`
/// and `\` escapes.
pub fn glob_match(pattern: &str, key: &str) -> bool {
    match_bytes(pattern.as_bytes(), key.as_bytes())
}

/// Greedy wildcard match: every token other than `*` consumes exactly one
/// key byte, so on a mismatch only the most recent `*` needs to grow.
/// Runs in O(pattern * key).
fn match_bytes(pattern: &[u8], key: &[u8]) -> bool {
    let (mut p, mut k) = (0, 0);
    // Pattern index after the last `*`, and the key index it absorbs up to.
    let mut star: Option<(usize, usize)> = None;

    while k < key.len() {
        if pattern.get(p) == Some(&b'*') {
            p += 1;
            star = Some((p, k));
            continue;
        }
        if let Some(next) = match_single(pattern, p, key[k]) {
            p = next;
            k += 1;
            continue;
        }
        match star {
            Some((after_star, absorbed)) => {
                p = after_star;
                k = absorbed + 1;
                star = Some((after_star, k));
            }
            None => return false,
        }
    }
    pattern[p..].iter().all(|&b| b == b'*')
}

/// Matches one non-`*` token at `pattern[p]` against `c`; returns the
/// index of the next token.
fn match_single(pattern: &[u8], p: usize, c: u8) -> Option<usize> {
    match *pattern.get(p)? {
        b'?' => Some(p + 1),
        b'[' => {
            let (matched, rest) = match_class(&pattern[p + 1..], c);
            matched.then_some(pattern.len() - rest.len())
        }
        b'\\' if p + 1 < pattern.len() => (pattern[p + 1] == c).then_some(p + 2),
        b => (b == c).then_some(p + 1),
    }
}

/// Matches `c` against a class body (after `[`); returns the verdict and
/// the pattern remaining after the closing `]`.
fn match_class(mut class: &[u8], c: u8) -> (bool, &[u8]) {
    let negate = class.first() == Some(&b'^');
    if negate {
        class = &class[1..];
    }

    let mut matched = false;
    loop {
        match class {
            [] => break,
            [b']', rest @ ..] => {
                class = rest;
                break;
            }
            [b'\\', escaped, rest @ ..] => {
                matched |= *escaped == c;
                class = rest;
            }
            [lo, b'-', hi, rest @ ..] if *hi != b']' => {
                let (lo, hi) = if lo <= hi { (*lo, *hi) } else { (*hi, *lo) };
                matched |= (lo..=hi).contains(&c);
                class = rest;
            }
            [x, rest @ ..] => {
                matched |= *x == c;
                class = rest;
            }
        }
    }

    (matched != negate, class)
}

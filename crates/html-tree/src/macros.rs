//! Byte-class span scanning, in the shape of C's `strspn`/`strcspn` but
//! with the class written as a `matches!` pattern.

macro_rules! strspn {
    ($bytes:expr, $pattern:pat) => {{
        $bytes
            .iter()
            .position(|&b| !matches!(b, $pattern))
            .unwrap_or($bytes.len())
    }};

    ($bytes:expr, $pattern:pat, $offset:expr) => {{
        $bytes[$offset..]
            .iter()
            .position(|&b| !matches!(b, $pattern))
            .unwrap_or($bytes.len() - $offset)
    }};
}

macro_rules! strcspn {
    ($bytes:expr, $pattern:pat) => {{
        $bytes
            .iter()
            .position(|&b| matches!(b, $pattern))
            .unwrap_or($bytes.len())
    }};

    ($bytes:expr, $pattern:pat, $offset:expr) => {{
        $bytes[$offset..]
            .iter()
            .position(|&b| matches!(b, $pattern))
            .unwrap_or($bytes.len() - $offset)
    }};
}

pub(crate) use {strcspn, strspn};

#[cfg(test)]
mod test {
    #[test]
    fn strspn_counts_the_matching_prefix() {
        assert_eq!(strspn!(b"  \tx", b' ' | b'\t'), 3);
        assert_eq!(strspn!(b"x  ", b' '), 0);
        assert_eq!(strspn!(b"   ", b' '), 3);
        assert_eq!(strspn!(b"a b", b' ', 1), 1);
        assert_eq!(strspn!(b"ab", b'a' | b'b', 2), 0);
    }

    #[test]
    fn strcspn_counts_until_the_first_match() {
        assert_eq!(strcspn!(b"abc>", b'>'), 3);
        assert_eq!(strcspn!(b">", b'>'), 0);
        assert_eq!(strcspn!(b"abc", b'>'), 3);
        assert_eq!(strcspn!(b"a>b>", b'>', 2), 1);
    }
}

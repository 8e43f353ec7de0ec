/// テキスト処理ユーティリティ。
///
/// ハッシュと文字数ベースの短縮を提供します。
use xxhash_rust::xxh3::xxh3_64;

/// テキストをXXH3でハッシュする。
#[must_use]
pub(crate) fn hash_text(text: &str) -> u64 {
    xxh3_64(text.as_bytes())
}

const ELLIPSIS: char = '…';

/// 単語境界で `width` 文字以内に短縮し、末尾に「…」を付ける。
///
/// 空白は先に1つへまとめる。幅を超える単語が1語だけの場合は文字境界で切る。
#[must_use]
pub fn shorten(text: &str, width: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }
    if width == 0 {
        return String::new();
    }

    let budget = width - 1;
    let mut out = String::new();
    let mut used = 0;
    for word in collapsed.split(' ') {
        let len = word.chars().count();
        let needed = if out.is_empty() { len } else { len + 1 };
        if used + needed > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
        used += needed;
    }

    if out.is_empty() {
        out = collapsed.chars().take(budget).collect();
    }
    out.push(ELLIPSIS);
    out
}

/// 先頭から `max_chars` 文字までに切り詰める。
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn hash_text_is_stable() {
        assert_eq!(hash_text("watchlist"), hash_text("watchlist"));
        assert_ne!(hash_text("a"), hash_text("b"));
    }

    #[rstest]
    #[case("short text", 20, "short text")]
    #[case("one two three four", 12, "one two…")]
    #[case("  spaced   out  ", 20, "spaced out")]
    #[case("abcdefghij", 5, "abcd…")]
    #[case("anything", 0, "")]
    fn shorten_cases(#[case] text: &str, #[case] width: usize, #[case] expected: &str) {
        let shortened = shorten(text, width);
        assert_eq!(shortened, expected);
        assert!(shortened.chars().count() <= width);
    }

    #[rstest]
    #[case("hello", 10, "hello")]
    #[case("hello", 3, "hel")]
    #[case("日本語テキスト", 3, "日本語")]
    fn truncate_chars_respects_char_boundaries(
        #[case] text: &str,
        #[case] max: usize,
        #[case] expected: &str,
    ) {
        assert_eq!(truncate_chars(text, max), expected);
    }
}

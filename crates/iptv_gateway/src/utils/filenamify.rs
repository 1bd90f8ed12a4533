macro_rules! regex {
    ($re:literal $(,)?) => {{
        static RE: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
        RE.get_or_init(|| regex::Regex::new($re).expect("invalid regex literal"))
    }};
}

/// 将 URL 末段等外部输入清洗为可以落盘的文件名，不会包含路径分隔符
pub fn filenamify<S: AsRef<str>>(input: S) -> String {
    let reserved = regex!("[<>:\"/\\\\|?*\u{0000}-\u{001F}\u{007F}\u{0080}-\u{009F}]+");
    let windows_reserved = regex!("(?i)^(con|prn|aux|nul|com\\d|lpt\\d)(\\..*)?$");
    let outer_periods = regex!("^\\.+|\\.+$");

    let input = reserved.replace_all(input.as_ref().trim(), "_");
    let mut result = outer_periods.replace_all(input.as_ref(), "_").into_owned();
    if windows_reserved.is_match(&result) {
        result.insert(0, '_');
    }
    result
}

/// 清洗后只剩下占位符号，说明原始输入不足以作为文件名
pub fn is_degenerate(name: &str) -> bool {
    name.chars().all(|c| matches!(c, '_' | '.' | ' '))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filenamify() {
        assert_eq!(filenamify("cctv1.png"), "cctv1.png");
        assert_eq!(filenamify(" cctv1.png "), "cctv1.png");
        assert_eq!(filenamify("a/b\\c"), "a_b_c");
        assert_eq!(filenamify("logo?.png"), "logo_.png");
        assert_eq!(filenamify("foo\u{0000}bar"), "foo_bar");
        assert_eq!(filenamify(".."), "_");
        assert_eq!(filenamify(".hidden"), "_hidden");
        assert_eq!(filenamify("con"), "_con");
        assert_eq!(filenamify("NUL.png"), "_NUL.png");
        assert_eq!(filenamify("湖南卫视.png"), "湖南卫视.png");
    }

    #[test]
    fn test_is_degenerate() {
        assert!(is_degenerate(""));
        assert!(is_degenerate("_"));
        assert!(is_degenerate("__._"));
        assert!(!is_degenerate("a_"));
    }
}

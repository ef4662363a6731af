//! Shell scripts standing in for the transition tool. They are run as
//! `sh <script> --pre <p> --post <p> <blocks…>`.

const PARSE_ARGS: &str = r#"pre=""; post=""; blocks=0
while [ $# -gt 0 ]; do
  case "$1" in
    --pre) pre="$2"; shift 2 ;;
    --post) post="$2"; shift 2 ;;
    *) blocks=$((blocks + 1)); shift ;;
  esac
done
"#;

/// Copies the pre-state to the post-state and exits 0
pub fn copy_pre_to_post() -> String {
    format!(
        "{PARSE_ARGS}cat \"$pre\" > \"$post\"\necho \"applied $blocks blocks\"\necho \"transition ok\" >&2\n"
    )
}

/// Exits 2 without writing a post-state
pub fn fail_without_post() -> String {
    format!("{PARSE_ARGS}echo \"invalid block\" >&2\nexit 2\n")
}

/// Writes a post-state, then reports failure
pub fn fail_with_post() -> String {
    format!("{PARSE_ARGS}printf 'partial' > \"$post\"\nexit 1\n")
}

/// Sleeps before copying, so attempts overlap
pub fn slow_copy(seconds: &str) -> String {
    format!("{PARSE_ARGS}sleep {seconds}\ncat \"$pre\" > \"$post\"\n")
}

/// Never finishes on its own
pub fn hang() -> String {
    "exec sleep 30\n".to_string()
}

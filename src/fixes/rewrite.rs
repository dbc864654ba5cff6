//! Pure text rewrites used by the fix patterns.

use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Versions below this are bumped by [`bump_node_versions`].
pub const MIN_SUPPORTED_NODE: u32 = 18;
pub const TARGET_NODE: u32 = 20;

static NODE_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(node-version:\s*['"]?)(\d+)(['"]?)"#).expect("valid regex")
});

/// Point every `uses: <action>@vN` with N below `to_major` at `@v<to_major>`.
///
/// Minor/patch suffixes are dropped (`@v2.3.1` -> `@v4`); refs that are not
/// a version (branches, SHAs) and newer majors are left alone.
pub fn upgrade_action(content: &str, action: &str, to_major: u32) -> String {
    let pattern = format!(
        r"(?im)(^|[^\w./-])({}@)v?(\d+)(?:\.\d+)*\b",
        regex::escape(action)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &Captures<'_>| {
        let current = caps[3].parse::<u32>().unwrap_or(u32::MAX);
        if current < to_major {
            format!("{}{}v{to_major}", &caps[1], &caps[2])
        } else {
            caps[0].to_string()
        }
    })
    .into_owned()
}

/// Raise every `node-version` below 18 to 20, keeping any quoting.
pub fn bump_node_versions(content: &str) -> String {
    NODE_VERSION
        .replace_all(content, |caps: &Captures<'_>| {
            let version = caps[2].parse::<u32>().unwrap_or(u32::MAX);
            if version < MIN_SUPPORTED_NODE {
                format!("{}{TARGET_NODE}{}", &caps[1], &caps[3])
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

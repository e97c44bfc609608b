//! Shell snippets shared by the script renderers

use super::ConfigError;
use crate::shell;

/// Environment variable naming the fd progress messages go to
pub const PROGRESS_FD_VAR: &str = "SYSPROV_PROGRESS_FD";

/// Re-runs a package manager command while it reports lock contention (100).
pub const PACKAGE_MANAGER_LOOP: &str = r#"package_manager_loop() {
    local rc=
    while true; do
        if ("$@"); then
            return 0
        else
            rc=$?
        fi
        if [ $rc -eq 100 ]; then
            sleep 10s
            continue
        fi
        return $rc
    done
}"#;

pub const LOOPER: &str = "package_manager_loop ";

pub fn preamble() -> Vec<String> {
    vec![
        "#!/bin/sh".to_string(),
        "set -xe".to_string(),
        format!("test -n \"${0}\" || {0}=2", PROGRESS_FD_VAR),
    ]
}

/// Command echoing `msg` to the progress fd
pub fn log_progress(msg: &str) -> Result<String, ConfigError> {
    Ok(format!("echo {} >&${}", shell::quote(msg)?, PROGRESS_FD_VAR))
}

/// Commands creating `path` with `mode` and exactly `content`
pub fn write_file_commands(path: &str, content: &str, mode: u32) -> Result<Vec<String>, ConfigError> {
    let qpath = shell::quote(path)?;
    Ok(vec![
        format!("install -D -m {:o} /dev/null {}", mode, qpath),
        format!("printf '%s' {} > {}", shell::quote(content)?, qpath),
    ])
}

/// Commands renaming cached index files in `lists_dir` whose names embed
/// `old_mirror` so they embed `new_mirror` instead.
///
/// The mirrors may be shell expressions such as `$old_mirror`. Nothing is
/// renamed when both map to the same prefix or when the cache is empty.
pub fn rename_list_files_commands(lists_dir: &str, old_mirror: &str, new_mirror: &str) -> Vec<String> {
    use crate::packaging::apt::SOURCE_LIST_PREFIX;

    vec![
        format!("old_prefix={}/$(echo {} | {})", lists_dir, old_mirror, SOURCE_LIST_PREFIX),
        format!("new_prefix={}/$(echo {} | {})", lists_dir, new_mirror, SOURCE_LIST_PREFIX),
        r#"if [ "$old_prefix" != "$new_prefix" ]; then
    for old in "${old_prefix}"_*; do
        [ -e "$old" ] || continue
        new=$(echo "$old" | sed "s,^$old_prefix,$new_prefix,")
        mv "$old" "$new"
    done
fi"#
        .to_string(),
    ]
}

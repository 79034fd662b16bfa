//! `name_to_path`: the 9p server hands the adapter a parent path plus a
//! single path component (never a multi-segment string) and expects the
//! composed absolute path back.

/// Compose `dir` and `name` into an absolute path, handling `.` and `..`
/// against the root without ever walking above it.
pub fn name_to_path(dir: &str, name: &str) -> String {
    match name {
        "." => dir.to_string(),
        ".." => {
            if dir == "/" {
                "/".to_string()
            } else {
                match dir.rfind('/') {
                    Some(0) => "/".to_string(),
                    Some(idx) => dir[..idx].to_string(),
                    None => "/".to_string(),
                }
            }
        }
        _ if dir == "/" => format!("/{name}"),
        _ => format!("{dir}/{name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_returns_the_same_directory() {
        assert_eq!(name_to_path("/a/b", "."), "/a/b");
    }

    #[test]
    fn dotdot_climbs_one_level() {
        assert_eq!(name_to_path("/a/b", ".."), "/a");
    }

    #[test]
    fn dotdot_at_root_stays_at_root() {
        assert_eq!(name_to_path("/", ".."), "/");
    }

    #[test]
    fn plain_name_is_appended() {
        assert_eq!(name_to_path("/a", "b"), "/a/b");
    }

    #[test]
    fn plain_name_under_root_avoids_a_double_slash() {
        assert_eq!(name_to_path("/", "etc"), "/etc");
    }
}

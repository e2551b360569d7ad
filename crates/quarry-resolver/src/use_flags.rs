use quarry_version::Version;

/// The pseudo-package name encoding a USE flag.
pub fn use_flag_package_name(flag: &str) -> String {
    format!("use:{flag}")
}

pub fn is_use_flag_package(name: &str) -> bool {
    name.starts_with("use:")
}

/// The pseudo-version encoding a polarity: `1.2.3` for enabled, `0.0.0` for
/// disabled.
pub fn pseudo_version(enabled: bool) -> Version {
    if enabled {
        Version::new(1, 2, 3)
    } else {
        Version::new(0, 0, 0)
    }
}

/// Rewrites solver output so USE-flag pseudo-packages read as USE flags:
/// `use:ssl 1.2.3` becomes `USE flag +ssl`, `use:ssl 0.0.0` becomes
/// `USE flag -ssl`, and on those lines "installed" reads "satisfied" and
/// "versions" reads "USE flags".
pub fn rewrite_unsat_message(message: &str) -> String {
    let mut result = String::with_capacity(message.len());
    for line in message.lines() {
        if line.contains("use:") {
            result.push_str(&rewrite_line(line));
        } else {
            result.push_str(line);
        }
        result.push('\n');
    }
    result
}

fn rewrite_line(line: &str) -> String {
    let mut rest = line;
    let mut result = String::with_capacity(line.len());
    while let Some(index) = rest.find("use:") {
        result.push_str(&rest[..index]);
        let after = &rest[index + 4..];

        // The flag name runs up to the first whitespace.
        let name_end = after
            .find(char::is_whitespace)
            .unwrap_or(after.len());
        let flag = &after[..name_end];
        let mut tail = after[name_end..].trim_start();

        // An optional comparator precedes the pseudo-version.
        tail = tail.strip_prefix("==").unwrap_or(tail);
        let polarity = if let Some(stripped) = tail.strip_prefix("1.2.3") {
            tail = stripped;
            Some('+')
        } else if let Some(stripped) = tail.strip_prefix("0.0.0") {
            tail = stripped;
            Some('-')
        } else {
            None
        };

        match polarity {
            Some(polarity) => {
                result.push_str("USE flag ");
                result.push(polarity);
                result.push_str(flag);
                rest = tail;
            }
            None => {
                // Not one of the pseudo-versions; leave the token alone.
                result.push_str("use:");
                result.push_str(flag);
                rest = &after[name_end..];
            }
        }
    }
    result.push_str(rest);
    result
        .replace("installed", "satisfied")
        .replace("versions", "USE flags")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_versions_encode_polarity() {
        assert_eq!(pseudo_version(true), Version::new(1, 2, 3));
        assert_eq!(pseudo_version(false), Version::new(0, 0, 0));
        assert_eq!(use_flag_package_name("ssl"), "use:ssl");
        assert!(is_use_flag_package("use:ssl"));
        assert!(!is_use_flag_package("user-agent"));
    }

    #[test]
    fn rewrites_candidates_and_requirements() {
        assert_eq!(
            rewrite_line("├─ use:ssl 1.2.3, which cannot be installed"),
            "├─ USE flag +ssl, which cannot be satisfied"
        );
        assert_eq!(
            rewrite_line("└─ use:ssl ==0.0.0 cannot be installed because..."),
            "└─ USE flag -ssl cannot be satisfied because..."
        );
    }

    #[test]
    fn rewrites_versions_to_use_flags_on_flag_lines() {
        assert_eq!(
            rewrite_line("use:zlib 1.2.3 has conflicting versions"),
            "USE flag +zlib has conflicting USE flags"
        );
    }

    #[test]
    fn leaves_other_lines_untouched() {
        let message = "a 1.0.0 would require\nb >=1.0.0, which cannot be installed\n";
        assert_eq!(rewrite_unsat_message(message), message);
    }
}

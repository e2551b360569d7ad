use std::path::Path;

/// The fixed preamble of every install script. The recipe body is appended
/// after it and can rely on the exported variables and directories.
///
/// Placeholders are enclosed in single quotes in the script, so values are
/// escaped with [`escape_single_quotes`]; double quotes must not be used
/// here.
const INSTALL_SCRIPT_PREAMBLE: &str = "\
#!/bin/bash

set -eo pipefail # exit on error

PACKAGE='{package}'
VERSION='{version}'
ROOT_BUILD_DIR='{build_dir}'
INSTALL_DIR='{install_dir}'

echo \"Installing to $INSTALL_DIR\"

DOWNLOAD_DIR=\"$ROOT_BUILD_DIR/download\"
ARCHIVE_FILE=\"${PACKAGE}-${VERSION}.archive\"
SOURCE_DIR=\"$ROOT_BUILD_DIR/source/${PACKAGE}-${VERSION}\"
BUILD_DIR=\"$ROOT_BUILD_DIR/build/${PACKAGE}-${VERSION}\"
PATCH_DIR=\"$ROOT_BUILD_DIR/source\"
BUILD_LOG_DIR=\"$ROOT_BUILD_DIR/logs/${PACKAGE}-${VERSION}\"

mkdir -p \"$DOWNLOAD_DIR\"
rm -rf \"$SOURCE_DIR\"
mkdir -p \"$SOURCE_DIR\"
rm -rf \"$BUILD_DIR\"
mkdir -p \"$BUILD_DIR\"
rm -rf \"$BUILD_LOG_DIR\"
mkdir -p \"$BUILD_LOG_DIR\"

LD_LIBRARY_PATH=\"$INSTALL_DIR/lib\"
PKG_CONFIG_PATH=\"$INSTALL_DIR/lib/pkgconfig\"
export LD_LIBRARY_PATH
export PKG_CONFIG_PATH

";

/// Stitches the complete install script for one package: the preamble with
/// paths and environment bound, followed by the recipe-provided body.
pub fn assemble_install_script(
    package: &str,
    version: &str,
    build_dir: &Path,
    install_dir: &Path,
    body: &[u8],
) -> String {
    let mut script = INSTALL_SCRIPT_PREAMBLE
        .replace("{package}", &escape_single_quotes(package))
        .replace("{version}", &escape_single_quotes(version))
        .replace(
            "{build_dir}",
            &escape_single_quotes(&build_dir.to_string_lossy()),
        )
        .replace(
            "{install_dir}",
            &escape_single_quotes(&install_dir.to_string_lossy()),
        );
    script.push_str(&String::from_utf8_lossy(body));
    script
}

/// Escapes a value for inclusion inside single quotes in a shell script:
/// each `'` becomes `'"'"'`.
fn escape_single_quotes(value: &str) -> String {
    value.replace('\'', r#"'"'"'"#)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binds_package_and_paths() {
        let script = assemble_install_script(
            "zlib",
            "1.3.0",
            Path::new("/project/.quarry/build"),
            Path::new("/project/.quarry/install"),
            b"make install\n",
        );
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("PACKAGE='zlib'"));
        assert!(script.contains("VERSION='1.3.0'"));
        assert!(script.contains("ROOT_BUILD_DIR='/project/.quarry/build'"));
        assert!(script.contains("INSTALL_DIR='/project/.quarry/install'"));
        assert!(script.ends_with("make install\n"));
    }

    #[test]
    fn single_quotes_are_escaped() {
        assert_eq!(escape_single_quotes("it's"), r#"it'"'"'s"#);
        let script = assemble_install_script(
            "o'brien",
            "1.0.0",
            Path::new("/b"),
            Path::new("/i"),
            b"",
        );
        assert!(script.contains(r#"PACKAGE='o'"'"'brien'"#));
    }
}

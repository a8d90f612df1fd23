use super::*;

#[test]
fn supported_platforms_map_to_packages() {
    let cases = [
        ("macos", "x86_64", Libc::Gnu, "@lancedb/lancedb-darwin-x64"),
        ("macos", "aarch64", Libc::Gnu, "@lancedb/lancedb-darwin-arm64"),
        ("linux", "x86_64", Libc::Gnu, "@lancedb/lancedb-linux-x64-gnu"),
        ("linux", "x86_64", Libc::Musl, "@lancedb/lancedb-linux-x64-musl"),
        ("linux", "aarch64", Libc::Gnu, "@lancedb/lancedb-linux-arm64-gnu"),
        ("linux", "aarch64", Libc::Musl, "@lancedb/lancedb-linux-arm64-musl"),
        ("windows", "x86_64", Libc::Gnu, "@lancedb/lancedb-win32-x64-msvc"),
        ("windows", "aarch64", Libc::Gnu, "@lancedb/lancedb-win32-arm64-msvc"),
    ];

    for (os, arch, libc, package) in cases {
        let target = Target::detect(os, arch, libc).expect("platform should be supported");
        assert_eq!(target.package_name(), package, "{os}/{arch}");
    }
}

#[test]
fn binary_name_follows_triple() {
    assert_eq!(
        Target::LinuxArm64Musl.binary_name(),
        "lancedb.linux-arm64-musl.node"
    );
    assert_eq!(
        Target::DarwinArm64.binary_name(),
        "lancedb.darwin-arm64.node"
    );
}

#[test]
fn unsupported_platforms_are_errors() {
    for (os, arch) in [("freebsd", "x86_64"), ("linux", "riscv64"), ("windows", "x86")] {
        let result = Target::detect(os, arch, Libc::Gnu);
        assert!(
            matches!(result, Err(CodeIndexError::Platform(_))),
            "{os}/{arch} should be unsupported"
        );
    }
}

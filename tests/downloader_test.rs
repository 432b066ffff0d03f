use comix_dl::downloader;

#[test]
fn test_sanitize_filename() {
    let filenames = vec![
        "Chapter 1: Test",
        "File/with/slashes",
        "Windows:reserved*chars?",
        "Very.long.file.name.that.should.be.truncated.if.it.exceeds.the.maximum.length.allowed.by.the.underlying.filesystem.which.varies.but.is.typically.around.255.characters.on.modern.systems.like.Windows.NTFS.or.Linux.ext4.this.helps.ensure.compatibility.across.different.platforms",
    ];

    for filename in filenames {
        let sanitized = downloader::sanitize_filename(filename);

        assert!(!sanitized.is_empty());
        assert!(sanitized.len() <= 255);
        for forbidden in ['/', '\\', ':', '*', '?', '"', '<', '>', '|'] {
            assert!(!sanitized.contains(forbidden), "{} kept {:?}", sanitized, forbidden);
        }
    }
}

#[test]
fn test_ensure_dir_exists() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");

    downloader::ensure_dir_exists(&nested).unwrap();
    assert!(nested.is_dir());
    // Existing directories are fine
    downloader::ensure_dir_exists(&nested).unwrap();
}

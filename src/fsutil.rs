use crate::error::{Error, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

#[cfg(unix)]
use std::os::unix::fs::{DirBuilderExt, OpenOptionsExt, PermissionsExt};

/// Creates (or truncates) `path` with `mode` and writes `contents`.
pub fn write_with_mode(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    opts.mode(mode);
    let mut f = opts.open(path).map_err(Error::io(path))?;
    f.write_all(contents.as_bytes()).map_err(Error::io(path))?;
    f.sync_all().map_err(Error::io(path))?;
    // `mode` is masked by the umask on create; pin it.
    #[cfg(unix)]
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(Error::io(path))?;
    #[cfg(not(unix))]
    let _ = mode;
    Ok(())
}

/// Sibling path used to stage a replacement of `path`.
pub fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces `path` by writing a sibling temp file and renaming it over.
pub fn replace_atomic(path: &Path, contents: &str, mode: u32) -> Result<()> {
    let tmp = tmp_path(path);
    write_with_mode(&tmp, contents, mode)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        Error::Io { path: path.to_path_buf(), source: e }
    })
}

pub fn create_dir_with_mode(path: &Path, mode: u32) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;
    builder.create(path).map_err(Error::io(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_atomic_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("server.conf");
        fs::write(&p, "old").unwrap();
        replace_atomic(&p, "new", 0o600).unwrap();
        assert_eq!(fs::read_to_string(&p).unwrap(), "new");
        assert!(!tmp_path(&p).exists());
    }

    #[cfg(unix)]
    #[test]
    fn written_files_are_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("privatekey");
        write_with_mode(&p, "k", 0o600).unwrap();
        let mode = fs::metadata(&p).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}

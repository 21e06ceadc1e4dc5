//! Hardened archive extraction
//!
//! Extracts `.tar.gz` chart archives into a freshly created, randomly
//! named directory. Every entry path is validated against the destination
//! boundary (zip-slip), symlink targets are resolved to their real path
//! before the same check, and the decompressed stream is capped to bound
//! decompression bombs. Extraction is all-or-nothing: on any failure the
//! destination directory is removed before the error propagates.

use flate2::read::GzDecoder;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};

use crate::error::{CoreError, Result};

/// Default cap on the decompressed stream: 1 GiB
pub const DEFAULT_MAX_BYTES: u64 = 1 << 30;

/// Extraction options
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum decompressed size in bytes, 0 disables the bound
    pub max_bytes: u64,

    /// Honor file modes stored in the archive instead of forcing `0644`
    pub preserve_mode: bool,

    /// Parent directory for extraction directories, platform temp dir if unset
    pub work_dir: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            preserve_mode: false,
            work_dir: None,
        }
    }
}

/// An extraction directory whose disk space this value owns
///
/// [`ExtractedDir::release`] reclaims the directory tree. Dropping without
/// releasing reclaims it best-effort; for the already-extracted fast path,
/// [`ExtractedDir::retained`] wraps a directory the cache owns and both
/// release and drop leave it alone.
#[derive(Debug)]
pub struct ExtractedDir {
    path: PathBuf,
    owned: bool,
}

impl ExtractedDir {
    /// Wrap a directory owned elsewhere; cleanup is a no-op
    pub fn retained(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            owned: false,
        }
    }

    /// Absolute path of the extracted directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the directory tree and consume the handle
    pub fn release(mut self) -> Result<()> {
        if self.owned {
            self.owned = false;
            std::fs::remove_dir_all(&self.path)?;
        }
        Ok(())
    }
}

impl Drop for ExtractedDir {
    fn drop(&mut self) {
        if self.owned {
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                tracing::warn!(
                    "Failed to clean up extraction directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Extract a `.tar.gz` archive into a fresh, uniquely named directory
pub fn extract_archive(archive_path: &Path, opts: &ExtractOptions) -> Result<ExtractedDir> {
    let dest = create_extract_dir(opts.work_dir.as_deref())?;

    match unpack_into(archive_path, &dest, opts) {
        Ok(()) => Ok(ExtractedDir { path: dest, owned: true }),
        Err(e) => {
            // No partial extraction left behind.
            let _ = std::fs::remove_dir_all(&dest);
            Err(e)
        }
    }
}

/// Create the destination directory with a cryptographically random name
///
/// The name carries no trace of the source archive, so concurrent
/// extractions never collide and the path cannot be pre-created by an
/// attacker.
fn create_extract_dir(work_dir: Option<&Path>) -> Result<PathBuf> {
    let parent = work_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(std::env::temp_dir);
    std::fs::create_dir_all(&parent)?;

    for _ in 0..16 {
        let token: String = rand::rng()
            .sample_iter(Alphanumeric)
            .take(20)
            .map(char::from)
            .collect();
        let candidate = parent.join(format!("charthaul-{token}"));
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }

    Err(CoreError::Archive {
        message: format!(
            "could not create a unique extraction directory under {}",
            parent.display()
        ),
    })
}

fn unpack_into(archive_path: &Path, dest: &Path, opts: &ExtractOptions) -> Result<()> {
    let file = File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let limited = LimitedReader::new(decoder, opts.max_bytes);
    let mut archive = Archive::new(limited);

    // dest was just created, so this cannot fail for non-existence.
    let canonical_dest = dest.canonicalize()?;

    for entry in archive.entries().map_err(|e| map_limit(e, opts.max_bytes))? {
        let mut entry = entry.map_err(|e| map_limit(e, opts.max_bytes))?;
        let entry_path = entry.path()?.into_owned();
        let target = safe_join(dest, &entry_path)?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                std::fs::create_dir_all(&target)?;
            }
            EntryType::Symlink => {
                let link = entry.link_name()?.ok_or_else(|| CoreError::Archive {
                    message: format!("symlink entry without target: {}", entry_path.display()),
                })?;
                write_symlink(&canonical_dest, &target, &entry_path, &link)?;
            }
            EntryType::Link => {
                let link = entry.link_name()?.ok_or_else(|| CoreError::Archive {
                    message: format!("hard link entry without target: {}", entry_path.display()),
                })?;
                let source = safe_join(dest, &link)?;
                std::fs::hard_link(&source, &target)?;
            }
            EntryType::Regular | EntryType::Continuous | EntryType::GNUSparse => {
                write_file(&mut entry, &target, opts)?;
            }
            // Metadata entries (pax headers, GNU long names) are consumed
            // by the tar reader itself.
            _ => {}
        }
    }

    Ok(())
}

fn write_file<R: Read>(entry: &mut tar::Entry<'_, R>, target: &Path, opts: &ExtractOptions) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut out = File::create(target)?;
    std::io::copy(entry, &mut out).map_err(|e| map_limit(e, opts.max_bytes))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = if opts.preserve_mode {
            // Stored modes can carry junk in the high bits; keep only the
            // permission bits.
            entry.header().mode()? & 0o7777
        } else {
            0o644
        };
        std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode))?;
    }

    Ok(())
}

/// Create a symlink after validating where its target really points
///
/// The link text is resolved relative to the entry's containing directory
/// and evaluated to its real path before the boundary check. A prefix
/// check on the raw link text alone would miss targets that traverse an
/// already-created symlink back out of the destination.
fn write_symlink(
    canonical_dest: &Path,
    target: &Path,
    entry_path: &Path,
    link: &Path,
) -> Result<()> {
    let candidate = if link.is_absolute() {
        link.to_path_buf()
    } else {
        target
            .parent()
            .map(|p| p.join(link))
            .unwrap_or_else(|| link.to_path_buf())
    };

    let resolved = realpath_lenient(&candidate);
    if resolved != canonical_dest && !resolved.starts_with(canonical_dest) {
        return Err(CoreError::PathEscape {
            entry: entry_path.display().to_string(),
        });
    }

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(link, target)?;
    #[cfg(not(unix))]
    {
        let _ = (link, target);
    }

    Ok(())
}

/// Join an archive entry path onto the destination, rejecting escapes
///
/// Absolute paths and any `..` traversal past the destination root fail
/// with [`CoreError::PathEscape`].
fn safe_join(dest: &Path, entry_path: &Path) -> Result<PathBuf> {
    let escape = || CoreError::PathEscape {
        entry: entry_path.display().to_string(),
    };

    let mut target = dest.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                // Popping past the destination root is an escape.
                if target == dest || !target.pop() {
                    return Err(escape());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if target != dest && !target.starts_with(dest) {
        return Err(escape());
    }
    Ok(target)
}

/// Resolve a path to its real location, tolerating a missing tail
///
/// Canonicalizes the deepest existing ancestor (following any symlinks
/// created by earlier entries), then applies the remaining components
/// lexically.
fn realpath_lenient(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut tail: Vec<std::ffi::OsString> = Vec::new();

    while !existing.exists() {
        match existing.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => break,
        }
        if !existing.pop() {
            break;
        }
    }

    let mut resolved = existing.canonicalize().unwrap_or(existing);
    for part in tail.iter().rev() {
        if part == ".." {
            resolved.pop();
        } else if part != "." {
            resolved.push(part);
        }
    }
    resolved
}

/// Byte-counting reader that fails once the limit is crossed
///
/// Wraps the *decompressed* stream. Unlike `Read::take`, crossing the
/// limit is an error, never a silent truncation.
struct LimitedReader<R> {
    inner: R,
    limit: u64,
    remaining: u64,
}

impl<R: Read> LimitedReader<R> {
    fn new(inner: R, limit: u64) -> Self {
        Self {
            inner,
            limit,
            remaining: limit,
        }
    }
}

impl<R: Read> Read for LimitedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.limit > 0 {
            if n as u64 > self.remaining {
                return Err(std::io::Error::new(
                    ErrorKind::FileTooLarge,
                    "decompressed size limit exceeded",
                ));
            }
            self.remaining -= n as u64;
        }
        Ok(n)
    }
}

fn map_limit(e: std::io::Error, limit: u64) -> CoreError {
    if e.kind() == ErrorKind::FileTooLarge {
        CoreError::SizeLimit { limit }
    } else {
        CoreError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use tar::{Builder, Header};
    use tempfile::TempDir;

    fn opts_in(work_dir: &Path) -> ExtractOptions {
        ExtractOptions {
            work_dir: Some(work_dir.to_path_buf()),
            ..ExtractOptions::default()
        }
    }

    fn build_archive<F>(path: &Path, fill: F)
    where
        F: FnOnce(&mut Builder<GzEncoder<File>>),
    {
        let file = File::create(path).unwrap();
        let encoder = GzEncoder::new(file, Compression::default());
        let mut builder = Builder::new(encoder);
        fill(&mut builder);
        builder.into_inner().unwrap().finish().unwrap();
    }

    fn add_file(builder: &mut Builder<GzEncoder<File>>, path: &str, content: &[u8], mode: u32) {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(mode);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, path, content).unwrap();
    }

    /// Write the header name bytes directly: `Builder::append_data` refuses
    /// to create traversal paths, but hostile archives contain them anyway.
    fn add_file_raw(builder: &mut Builder<GzEncoder<File>>, path: &str, content: &[u8]) {
        let mut header = Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.as_mut_bytes()[..path.len()].copy_from_slice(path.as_bytes());
        header.set_cksum();
        builder.append(&header, content).unwrap();
    }

    fn add_symlink(builder: &mut Builder<GzEncoder<File>>, path: &str, target: &str) {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Symlink);
        header.set_size(0);
        header.set_mtime(0);
        builder.append_link(&mut header, path, target).unwrap();
    }

    #[test]
    fn test_extract_regular_archive() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chart.tar.gz");
        build_archive(&archive, |b| {
            add_file(b, "Chart.yaml", b"name: web\nversion: 1.0.0\n", 0o644);
            add_file(b, "templates/deploy.yaml", b"kind: Deployment\n", 0o644);
        });

        let extracted = extract_archive(&archive, &opts_in(temp.path())).unwrap();
        assert!(extracted.path().join("Chart.yaml").is_file());
        assert!(extracted.path().join("templates/deploy.yaml").is_file());

        let dir = extracted.path().to_path_buf();
        extracted.release().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_extract_dirs_are_unique_and_unrelated_to_source() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chart.tar.gz");
        build_archive(&archive, |b| add_file(b, "a.txt", b"a", 0o644));

        let opts = opts_in(temp.path());
        let one = extract_archive(&archive, &opts).unwrap();
        let two = extract_archive(&archive, &opts).unwrap();
        assert_ne!(one.path(), two.path());
        let name = one.path().file_name().unwrap().to_string_lossy();
        assert!(!name.contains("chart.tar"), "dir name must not leak the source name");
    }

    #[test]
    fn test_zip_slip_rejected() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let archive = temp.path().join("evil.tar.gz");
        build_archive(&archive, |b| {
            add_file(b, "ok.txt", b"fine", 0o644);
            add_file_raw(b, "nested/../../escape.txt", b"evil");
        });

        let result = extract_archive(&archive, &opts_in(&work));
        assert!(matches!(result, Err(CoreError::PathEscape { .. })));

        // Nothing escaped and no partial extraction remains.
        assert!(!temp.path().join("escape.txt").exists());
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }

    #[test]
    fn test_safe_join_rejects_absolute_and_traversal() {
        let dest = Path::new("/tmp/dest");
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new("../../etc/passwd")).is_err());
        assert!(safe_join(dest, Path::new("a/../../b")).is_err());
        assert_eq!(
            safe_join(dest, Path::new("a/./b/../c")).unwrap(),
            PathBuf::from("/tmp/dest/a/c")
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_inside_is_created() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chart.tar.gz");
        build_archive(&archive, |b| {
            add_file(b, "data/file.txt", b"content", 0o644);
            add_symlink(b, "link.txt", "data/file.txt");
        });

        let extracted = extract_archive(&archive, &opts_in(temp.path())).unwrap();
        let link = extracted.path().join("link.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read(&link).unwrap(), b"content");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escape_rejected() {
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let archive = temp.path().join("evil.tar.gz");
        build_archive(&archive, |b| {
            add_symlink(b, "link", "../../outside");
        });

        let result = extract_archive(&archive, &opts_in(&work));
        assert!(matches!(result, Err(CoreError::PathEscape { .. })));
        assert_eq!(std::fs::read_dir(&work).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_chain_escape_rejected() {
        // `up` resolves to the destination's parent even though the link
        // text contains a single harmless-looking component.
        let temp = TempDir::new().unwrap();
        let work = temp.path().join("work");
        std::fs::create_dir(&work).unwrap();
        let archive = temp.path().join("evil.tar.gz");
        build_archive(&archive, |b| {
            add_symlink(b, "up", "..");
            add_symlink(b, "sneaky", "up/secret.txt");
        });

        let result = extract_archive(&archive, &opts_in(&work));
        assert!(matches!(result, Err(CoreError::PathEscape { .. })));
    }

    #[test]
    fn test_size_limit_enforced() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("bomb.tar.gz");
        // Highly compressible payload: small archive, large decompressed size.
        build_archive(&archive, |b| {
            add_file(b, "big.bin", &vec![0u8; 256 * 1024], 0o644);
        });

        let opts = ExtractOptions {
            max_bytes: 64 * 1024,
            work_dir: Some(temp.path().to_path_buf()),
            ..ExtractOptions::default()
        };
        let result = extract_archive(&archive, &opts);
        assert!(matches!(result, Err(CoreError::SizeLimit { .. })));
    }

    #[test]
    fn test_size_limit_zero_is_unlimited() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chart.tar.gz");
        build_archive(&archive, |b| {
            add_file(b, "big.bin", &vec![0u8; 256 * 1024], 0o644);
        });

        let opts = ExtractOptions {
            max_bytes: 0,
            work_dir: Some(temp.path().to_path_buf()),
            ..ExtractOptions::default()
        };
        assert!(extract_archive(&archive, &opts).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_modes() {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("chart.tar.gz");
        build_archive(&archive, |b| {
            add_file(b, "run.sh", b"#!/bin/sh\n", 0o755);
        });

        // Default: stored mode is ignored.
        let plain = extract_archive(&archive, &opts_in(temp.path())).unwrap();
        let mode = std::fs::metadata(plain.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o644);

        // preserve_mode honors the archive.
        let opts = ExtractOptions {
            preserve_mode: true,
            work_dir: Some(temp.path().to_path_buf()),
            ..ExtractOptions::default()
        };
        let preserved = extract_archive(&archive, &opts).unwrap();
        let mode = std::fs::metadata(preserved.path().join("run.sh"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_retained_dir_survives_release() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("cached");
        std::fs::create_dir(&dir).unwrap();

        let handle = ExtractedDir::retained(&dir);
        handle.release().unwrap();
        assert!(dir.exists());
    }
}

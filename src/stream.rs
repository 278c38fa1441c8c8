//! File access seam: transparent gzip decompression, head reads, and byte
//! ranges. Every decoder goes through these helpers so compressed products
//! behave exactly like plain ones.

use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .map_or(false, |e| e.eq_ignore_ascii_case("gz"))
}

/// Open a file for reading, decompressing on the fly if it is gzipped.
pub fn open(path: &Path) -> io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if is_gzip(path) {
        Ok(Box::new(GzDecoder::new(file)))
    } else {
        Ok(Box::new(file))
    }
}

/// Read up to `nbytes` from the (decompressed) head of a file.
pub fn head_file(path: &Path, nbytes: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    open(path)?.take(nbytes as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Read `length` bytes starting at `start` of the (decompressed) content, or
/// everything from `start` on when `length` is `None`. Plain files seek;
/// gzipped files skip by reading through.
pub fn read_range(path: &Path, start: u64, length: Option<u64>) -> io::Result<Vec<u8>> {
    let mut reader: Box<dyn Read> = if is_gzip(path) {
        let mut reader = open(path)?;
        io::copy(&mut reader.by_ref().take(start), &mut io::sink())?;
        reader
    } else {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;
        Box::new(file)
    };
    let mut buf = Vec::new();
    match length {
        Some(n) => {
            reader.take(n).read_to_end(&mut buf)?;
        }
        None => {
            reader.read_to_end(&mut buf)?;
        }
    }
    Ok(buf)
}

/// Size of the (decompressed) content in bytes. Cheap for plain files,
/// a full read-through for gzipped ones.
pub fn content_size(path: &Path) -> io::Result<u64> {
    if is_gzip(path) {
        Ok(io::copy(&mut open(path)?, &mut io::sink())?)
    } else {
        Ok(std::fs::metadata(path)?.len())
    }
}

/// Resolve a filename case-insensitively. Labels routinely cite data files in
/// a case that does not match the filesystem (`TABLE.DAT` vs `table.dat`).
pub fn check_cases(path: &Path) -> io::Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let wanted = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !wanted.is_empty() && parent.is_dir() {
        for entry in std::fs::read_dir(&parent)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if name == wanted || name == format!("{wanted}.gz") {
                return Ok(entry.path());
            }
        }
    }
    Err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("no file matching {} in any case", path.display()),
    ))
}

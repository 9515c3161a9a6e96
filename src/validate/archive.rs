// dbvault/src/validate/archive.rs
use flate2::read::{GzDecoder, MultiGzDecoder};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Decodes every gzip member of a file, which makes flate2 verify each CRC
/// and length trailer. Bytes after a member that are not another member are
/// an error. Returns the decompressed size.
pub fn verify_gzip_stream(path: &Path) -> io::Result<u64> {
    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(file));
    io::copy(&mut decoder, &mut io::sink())
}

/// Reads up to `limit` decompressed bytes from the start of a gzip file.
/// Bytes decoded before a later stream error are still returned.
pub fn read_gzip_head(path: &Path, limit: u64) -> io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut head = Vec::new();
    match MultiGzDecoder::new(BufReader::new(file)).take(limit).read_to_end(&mut head) {
        Ok(_) => Ok(head),
        Err(_) if !head.is_empty() => Ok(head),
        Err(e) => Err(e),
    }
}

/// Reads every entry of a tar stream to the end. Returns the entry count.
pub fn count_tar_entries<R: Read>(reader: R) -> io::Result<usize> {
    let mut archive = tar::Archive::new(reader);
    let mut count = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        io::copy(&mut entry, &mut io::sink())?;
        count += 1;
    }
    Ok(count)
}

/// Full read of a `.tar` or `.tar.gz` archive.
pub fn verify_tar_archive(path: &Path, gzipped: bool) -> io::Result<usize> {
    let reader = BufReader::new(File::open(path)?);
    if gzipped {
        count_tar_entries(GzDecoder::new(reader))
    } else {
        count_tar_entries(reader)
    }
}

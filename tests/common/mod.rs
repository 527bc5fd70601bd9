// Shared test utilities
use flate2::write::GzEncoder;
use flate2::Compression;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use tar::Header;

/// Generate deterministic test data of a given size
pub fn create_test_data(size: usize) -> Vec<u8> {
    // Create a repeating pattern for easier debugging
    let pattern = b"TESTDATA";
    let mut data = Vec::with_capacity(size);

    for i in 0..size {
        data.push(pattern[i % pattern.len()]);
    }

    data
}

/// Compress data using gzip compression
pub fn compress_gz(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .expect("Failed to write to gz encoder");
    encoder.finish().expect("Failed to finish gz compression")
}

/// Build an in-memory tar archive from (name, contents) pairs
pub fn build_tar(entries: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let mut tar_buf = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut tar_buf);
        for (name, data) in entries {
            let mut header = Header::new_gnu();
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
            header.set_cksum();
            builder
                .append_data(&mut header, name, data.as_slice())
                .expect("append tar entry");
        }
        builder.finish().expect("finish tar");
    }
    tar_buf
}

/// `sha256:<hex>` digest of `data`
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

/// A gzip-compressed layer blob holding one file
pub fn layer_blob(file_name: &str, size: usize) -> Vec<u8> {
    compress_gz(&build_tar(vec![(file_name, create_test_data(size))]))
}

/// Read every file of a tar archive into memory, keyed by entry path
pub fn read_archive(path: &Path) -> (Vec<String>, HashMap<String, Vec<u8>>) {
    let file = std::fs::File::open(path).expect("open archive");
    let mut archive = tar::Archive::new(file);
    let mut order = Vec::new();
    let mut files = HashMap::new();

    for entry in archive.entries().expect("archive entries") {
        let mut entry = entry.expect("archive entry");
        let name = entry
            .path()
            .expect("entry path")
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        if entry.header().entry_type().is_file() {
            let mut data = Vec::new();
            entry.read_to_end(&mut data).expect("read entry");
            files.insert(name.clone(), data);
        }
        order.push(name);
    }

    (order, files)
}

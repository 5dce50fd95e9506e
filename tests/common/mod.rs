#![allow(dead_code)]

use std::path::{Path, PathBuf};

/// Write an executable `/bin/sh` script standing in for an rpicam producer.
///
/// Producer arguments are appended by the caller and ignored by the script.
#[cfg(unix)]
pub fn producer_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("Should write script");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("Should make script executable");
    path
}

pub fn jpeg(payload: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

/// Split a multipart/x-mixed-replace body into part payloads.
///
/// Panics if any part deviates from the expected envelope.
pub fn parse_parts(mut body: &[u8]) -> Vec<Vec<u8>> {
    const PREFIX: &[u8] = b"--FRAME\r\nContent-Type: image/jpeg\r\nContent-Length: ";

    let mut parts = Vec::new();
    while !body.is_empty() {
        assert!(body.starts_with(PREFIX), "bad part header: {:?}", body);
        body = &body[PREFIX.len()..];

        let header_end = body
            .windows(4)
            .position(|w| w == b"\r\n\r\n")
            .expect("Should terminate headers");
        let len: usize = std::str::from_utf8(&body[..header_end])
            .unwrap()
            .parse()
            .expect("Should have numeric length");
        body = &body[header_end + 4..];

        parts.push(body[..len].to_vec());
        assert_eq!(&body[len..len + 2], b"\r\n");
        body = &body[len + 2..];
    }
    parts
}

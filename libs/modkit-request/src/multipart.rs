//! `multipart/form-data` payloads.

use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use std::collections::BTreeMap;

const BOUNDARY_BYTES: usize = 30;

/// A form with one main part (a file or a plain field) plus optional text
/// parameters.
///
/// # Example
///
/// ```
/// use modkit_request::{MultipartForm, Request};
///
/// let form = MultipartForm::new("upload", b"file contents".to_vec())
///     .file_name("report.csv")
///     .param("project", "alpha");
/// let request = Request::post("https://api.example.com/files").multipart(form);
/// # drop(request);
/// ```
#[derive(Debug, Clone)]
pub struct MultipartForm {
    params: BTreeMap<String, String>,
    field: String,
    file_name: Option<String>,
    source: Bytes,
}

impl MultipartForm {
    /// Create a form whose main part is named `field` and carries `source`.
    #[must_use]
    pub fn new(field: impl Into<String>, source: impl Into<Bytes>) -> Self {
        Self {
            params: BTreeMap::new(),
            field: field.into(),
            file_name: None,
            source: source.into(),
        }
    }

    /// Send the main part as a file upload with the given file name.
    #[must_use]
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Add a text parameter, emitted before the main part.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Encode the form with a fresh random boundary.
    ///
    /// Returns the payload and the matching `Content-Type` header value.
    #[must_use]
    pub fn into_parts(self) -> (Bytes, String) {
        let boundary = random_boundary();
        let payload = self.encode(&boundary);
        (payload, format!("multipart/form-data; boundary={boundary}"))
    }

    fn encode(&self, boundary: &str) -> Bytes {
        let mut out = BytesMut::with_capacity(self.source.len() + 256);

        for (name, value) in &self.params {
            put_part_header(&mut out, boundary, name, None);
            out.put_slice(value.as_bytes());
            out.put_slice(b"\r\n");
        }

        put_part_header(&mut out, boundary, &self.field, self.file_name.as_deref());
        out.put_slice(&self.source);
        out.put_slice(b"\r\n");

        out.put_slice(format!("--{boundary}--\r\n").as_bytes());
        out.freeze()
    }
}

fn put_part_header(out: &mut BytesMut, boundary: &str, name: &str, file_name: Option<&str>) {
    out.put_slice(format!("--{boundary}\r\n").as_bytes());
    match file_name {
        Some(file_name) => {
            out.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                    escape_quotes(name),
                    escape_quotes(file_name)
                )
                .as_bytes(),
            );
            out.put_slice(b"Content-Type: application/octet-stream\r\n");
        }
        None => {
            out.put_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"\r\n",
                    escape_quotes(name)
                )
                .as_bytes(),
            );
        }
    }
    out.put_slice(b"\r\n");
}

fn escape_quotes(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

fn random_boundary() -> String {
    let mut rng = rand::rng();
    (0..BOUNDARY_BYTES)
        .map(|_| format!("{:02x}", rng.random::<u8>()))
        .collect()
}

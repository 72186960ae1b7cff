//! Binding of the files of a multipart request to the variables of its operations.
//!
//! A multipart request carries an `operations` field with the request (or the batch of them), a
//! `map` field from file part names to the paths of the variables receiving them, and the file
//! parts. Paths are dot-delimited, starting with `variables` for a single request, or with the
//! index of the request and `variables` for a batch: `variables.avatar`,
//! `1.variables.files.0`.

use async_graphql::{BatchRequest, Request, UploadValue, Value, Variables};
use bytes::Bytes;
use derive_more::with_trait::{Display, Error};
use indexmap::IndexMap;

/// Map from file part names to the paths of the variables receiving them.
pub type UploadMap = IndexMap<String, Vec<String>>;

/// Uploaded file part.
#[derive(Clone, Debug)]
pub struct FilePart {
    /// Name of the multipart field.
    pub name: String,
    /// Name of the file as sent by the client.
    pub filename: String,
    /// MIME type of the file, if sent.
    pub content_type: Option<String>,
    /// Content of the file.
    pub content: Bytes,
}

/// Error of binding uploaded files.
#[derive(Clone, Debug, Display, Error, PartialEq)]
pub enum UploadError {
    /// Path pointing to no variable.
    #[display("unmatched json path: {path}")]
    UnmatchedPath {
        /// Mapped path.
        path: String,
    },

    /// File part named by the map but not sent.
    #[display("missing file part '{name}'")]
    MissingFile {
        /// Name of the file part.
        name: String,
    },
}

/// Binds every file of `files` to the variables the `map` points it to.
///
/// # Errors
///
/// If the `map` names a file which isn't sent, or points to a variable which doesn't exist.
pub fn bind_uploads(
    batch: &mut BatchRequest,
    map: &UploadMap,
    files: &[FilePart],
) -> Result<(), UploadError> {
    for (name, paths) in map {
        let file = files
            .iter()
            .find(|f| &f.name == name)
            .ok_or_else(|| UploadError::MissingFile { name: name.clone() })?;
        for path in paths {
            let unmatched = || UploadError::UnmatchedPath { path: path.clone() };
            let (request, var_path) = match &mut *batch {
                BatchRequest::Single(request) => (request, path.as_str()),
                BatchRequest::Batch(requests) => {
                    let (index, rest) = path.split_once('.').ok_or_else(unmatched)?;
                    let request = index
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| requests.get_mut(i))
                        .ok_or_else(unmatched)?;
                    (request, rest)
                }
            };
            bind(request, var_path, file).ok_or_else(unmatched)?;
        }
    }
    Ok(())
}

fn bind(request: &mut Request, path: &str, file: &FilePart) -> Option<()> {
    if !exists(&request.variables, path) {
        return None;
    }
    request.set_upload(
        path,
        UploadValue {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
            content: file.content.clone(),
        },
    );
    Some(())
}

fn exists(variables: &Variables, path: &str) -> bool {
    let Some(mut parts) = path.strip_prefix("variables.").map(|p| p.split('.')) else {
        return false;
    };
    let Some(mut current) = parts.next().and_then(|name| variables.get(name)) else {
        return false;
    };
    for part in parts {
        let next = match current {
            Value::List(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            Value::Object(fields) => fields.get(part),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::GraphQLBatchRequest;

    fn file(name: &str) -> FilePart {
        FilePart {
            name: name.into(),
            filename: format!("{name}.txt"),
            content_type: Some("text/plain".into()),
            content: Bytes::from_static(b"hello"),
        }
    }

    fn batch(operations: serde_json::Value) -> BatchRequest {
        serde_json::from_value::<GraphQLBatchRequest>(operations)
            .unwrap()
            .into_batch_request()
    }

    fn map(entries: &[(&str, &str)]) -> UploadMap {
        entries
            .iter()
            .map(|(name, path)| ((*name).into(), vec![(*path).into()]))
            .collect()
    }

    #[test]
    fn binds_single_request_files() {
        let mut req = batch(json!({
            "query": "mutation($f: Upload, $fs: [Upload]) { upload(f: $f, fs: $fs) }",
            "variables": {"f": null, "fs": [null, null]},
        }));

        bind_uploads(
            &mut req,
            &map(&[("0", "variables.f"), ("1", "variables.fs.1")]),
            &[file("0"), file("1")],
        )
        .unwrap();

        let BatchRequest::Single(req) = req else {
            panic!("not single");
        };
        assert_eq!(req.uploads.len(), 2);
        assert_eq!(req.uploads[1].filename, "1.txt");
        assert_eq!(
            req.variables["f"],
            Value::String("#__graphql_file__:0".into()),
        );
    }

    #[test]
    fn binds_batched_files() {
        let mut req = batch(json!([
            {"query": "{ a }"},
            {
                "query": "mutation($input: In) { b(input: $input) }",
                "variables": {"input": {"file": null}}
            },
        ]));

        bind_uploads(
            &mut req,
            &map(&[("f", "1.variables.input.file")]),
            &[file("f")],
        )
        .unwrap();

        let BatchRequest::Batch(reqs) = req else {
            panic!("not a batch");
        };
        assert!(reqs[0].uploads.is_empty());
        assert_eq!(reqs[1].uploads.len(), 1);
    }

    #[test]
    fn rejects_unmatched_paths() {
        let mut req = batch(json!({"query": "{ a }", "variables": {"f": null}}));

        assert_eq!(
            bind_uploads(&mut req, &map(&[("0", "variables.g")]), &[file("0")]),
            Err(UploadError::UnmatchedPath {
                path: "variables.g".into(),
            }),
        );
        assert_eq!(
            bind_uploads(&mut req, &map(&[("0", "variables.f.2")]), &[file("0")])
                .unwrap_err()
                .to_string(),
            "unmatched json path: variables.f.2",
        );
        assert_eq!(
            bind_uploads(&mut req, &map(&[("1", "variables.f")]), &[file("0")]),
            Err(UploadError::MissingFile { name: "1".into() }),
        );
    }
}

//! `$ref` resolution for `OpenAPI` documents.
//!
//! `openapiv3` models references as `ReferenceOr<T>` and leaves resolution to the caller. Refs
//! are resolved **relative to the document that contains them**, so every lookup carries the
//! current [`DocId`] and returns the id of the document the target was found in.
//!
//! Supported forms:
//! - local refs (`#/components/schemas/Hook`)
//! - file refs (`./common.yaml#/...`, `/abs/spec.yaml#/...`, `file:///...#/...`)
//! - URL refs (`http://localhost:5000/schemas.json#/...`)

use crate::error::{OpenApiToolsError, Result};
use openapiv3::{Parameter, PathItem, ReferenceOr, RequestBody, Response, Schema};
use parking_lot::RwLock;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocId {
    Url(Url),
    File(PathBuf),
}

impl DocId {
    /// Identify a document by where it was loaded from (URL or file path).
    ///
    /// # Errors
    ///
    /// Returns an error if the location looks like a URL but does not parse.
    pub fn parse(location: &str) -> Result<Self> {
        if location.starts_with("http://") || location.starts_with("https://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid document URL '{location}': {e}"))
            })?;
            Ok(DocId::Url(strip_fragment(url)))
        } else if location.starts_with("file://") {
            let url = Url::parse(location).map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Invalid document file URL '{location}': {e}"))
            })?;
            let path = url.to_file_path().map_err(|()| {
                OpenApiToolsError::OpenApi(format!("File URL is not a path: {location}"))
            })?;
            Ok(DocId::File(canonicalize_best_effort(path)))
        } else {
            Ok(DocId::File(canonicalize_best_effort(PathBuf::from(location))))
        }
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocId::Url(u) => write!(f, "{u}"),
            DocId::File(p) => write!(f, "{}", p.display()),
        }
    }
}

fn strip_fragment(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    std::fs::canonicalize(&path).unwrap_or(path)
}

/// Resolves refs against a root document plus any documents it points at (cached).
#[derive(Debug)]
pub struct OpenApiResolver {
    root_doc: DocId,
    client: Client,
    docs: RwLock<HashMap<DocId, Arc<Value>>>,
}

impl OpenApiResolver {
    /// Create a resolver whose root document is already in memory.
    #[must_use]
    pub fn new(root_doc: DocId, root: Value, client: Client) -> Self {
        let mut docs = HashMap::new();
        docs.insert(root_doc.clone(), Arc::new(root));
        Self {
            root_doc,
            client,
            docs: RwLock::new(docs),
        }
    }

    #[must_use]
    pub fn root_doc(&self) -> &DocId {
        &self.root_doc
    }

    /// A document that has already been loaded (the root always is).
    #[must_use]
    pub fn cached(&self, doc: &DocId) -> Option<Arc<Value>> {
        self.docs.read().get(doc).cloned()
    }

    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_parameter(
        &self,
        current_doc: &DocId,
        param: &ReferenceOr<Parameter>,
    ) -> Result<(DocId, Parameter)> {
        self.resolve(current_doc, param).await
    }

    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_request_body(
        &self,
        current_doc: &DocId,
        body: &ReferenceOr<RequestBody>,
    ) -> Result<(DocId, RequestBody)> {
        self.resolve(current_doc, body).await
    }

    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_schema(
        &self,
        current_doc: &DocId,
        schema: &ReferenceOr<Schema>,
    ) -> Result<(DocId, Schema)> {
        self.resolve(current_doc, schema).await
    }

    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_response(
        &self,
        current_doc: &DocId,
        response: &ReferenceOr<Response>,
    ) -> Result<(DocId, Response)> {
        self.resolve(current_doc, response).await
    }

    /// # Errors
    ///
    /// Returns an error if the reference cannot be resolved.
    pub async fn resolve_path_item(
        &self,
        current_doc: &DocId,
        item: &ReferenceOr<PathItem>,
    ) -> Result<(DocId, PathItem)> {
        self.resolve(current_doc, item).await
    }

    async fn resolve<T>(&self, current_doc: &DocId, r: &ReferenceOr<T>) -> Result<(DocId, T)>
    where
        T: Clone + DeserializeOwned,
    {
        let mut seen: HashSet<String> = HashSet::new();
        let mut doc = current_doc.clone();
        let mut cur: ReferenceOr<T> = r.clone();

        loop {
            match cur {
                ReferenceOr::Item(item) => return Ok((doc, item)),
                ReferenceOr::Reference { reference } => {
                    let (target_doc, pointer) = parse_ref(&doc, &reference)?;
                    if !seen.insert(ref_key(&target_doc, pointer.as_deref())) {
                        return Err(OpenApiToolsError::OpenApi(format!(
                            "Cyclic $ref detected while resolving: {reference}",
                        )));
                    }

                    let value = self
                        .select(&target_doc, pointer.as_deref(), &reference)
                        .await?;
                    cur = serde_json::from_value(value).map_err(|e| {
                        OpenApiToolsError::OpenApi(format!(
                            "$ref '{reference}' (doc {target_doc}) has an unexpected shape: {e}",
                        ))
                    })?;
                    doc = target_doc;
                }
            }
        }
    }

    async fn select(&self, doc: &DocId, pointer: Option<&str>, reference: &str) -> Result<Value> {
        let doc_value = self.load_doc(doc).await?;
        match pointer {
            Some(ptr) => doc_value.pointer(ptr).cloned().ok_or_else(|| {
                OpenApiToolsError::OpenApi(format!(
                    "Unresolved $ref '{reference}' (doc {doc}, missing pointer '{ptr}')",
                ))
            }),
            None => Ok((*doc_value).clone()),
        }
    }

    async fn load_doc(&self, doc: &DocId) -> Result<Arc<Value>> {
        if let Some(v) = self.docs.read().get(doc).cloned() {
            return Ok(v);
        }

        let content = match doc {
            DocId::File(path) => std::fs::read_to_string(path).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Failed to read referenced file {}: {e}",
                    path.display(),
                ))
            })?,
            DocId::Url(url) => self
                .client
                .get(url.clone())
                .send()
                .await
                .and_then(reqwest::Response::error_for_status)
                .map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to fetch referenced document: {}",
                        crate::redact::sanitize_reqwest_error(&e)
                    ))
                })?
                .text()
                .await
                .map_err(|e| {
                    OpenApiToolsError::OpenApi(format!(
                        "Failed to read referenced document body: {}",
                        crate::redact::sanitize_reqwest_error(&e)
                    ))
                })?,
        };

        // JSON first; YAML is the fallback for split specs kept next to the API source.
        let mut parsed: Value = serde_json::from_str(&content)
            .or_else(|_| serde_yaml::from_str(&content))
            .map_err(|e| {
                OpenApiToolsError::OpenApi(format!("Failed to parse referenced document {doc}: {e}"))
            })?;
        // Split files carry no version of their own; 3.1 keywords are rewritten regardless.
        crate::document::downgrade_schemas(&mut parsed);

        let parsed = Arc::new(parsed);
        self.docs.write().insert(doc.clone(), Arc::clone(&parsed));
        Ok(parsed)
    }
}

fn parse_ref(current_doc: &DocId, reference: &str) -> Result<(DocId, Option<String>)> {
    let (doc_part, fragment) = match reference.split_once('#') {
        Some((d, f)) => (d, Some(f)),
        None => (reference, None),
    };

    let pointer = match fragment {
        None | Some("") => None,
        Some(f) if f.starts_with('/') => Some(f.to_string()),
        Some(_) => {
            return Err(OpenApiToolsError::OpenApi(format!(
                "Unsupported $ref fragment (expected JSON pointer starting with '/'): {reference}",
            )));
        }
    };

    Ok((resolve_doc(current_doc, doc_part)?, pointer))
}

fn resolve_doc(current_doc: &DocId, doc_part: &str) -> Result<DocId> {
    if doc_part.is_empty() {
        return Ok(current_doc.clone());
    }

    if doc_part.starts_with("http://")
        || doc_part.starts_with("https://")
        || doc_part.starts_with("file://")
    {
        return DocId::parse(doc_part);
    }

    match current_doc {
        DocId::Url(base) => {
            let joined = base.join(doc_part).map_err(|e| {
                OpenApiToolsError::OpenApi(format!(
                    "Failed to resolve relative $ref '{doc_part}' against {base}: {e}",
                ))
            })?;
            Ok(DocId::Url(strip_fragment(joined)))
        }
        DocId::File(base) => {
            let resolved = if Path::new(doc_part).is_absolute() {
                PathBuf::from(doc_part)
            } else {
                base.parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(doc_part)
            };
            Ok(DocId::File(canonicalize_best_effort(resolved)))
        }
    }
}

fn ref_key(doc: &DocId, pointer: Option<&str>) -> String {
    let mut key = match doc {
        DocId::Url(u) => format!("url:{u}"),
        DocId::File(p) => format!("file:{}", p.display()),
    };
    if let Some(ptr) = pointer {
        key.push('#');
        key.push_str(ptr);
    }
    key
}

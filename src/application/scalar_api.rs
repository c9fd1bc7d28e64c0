// Backend contract for the scalar plugin endpoints
use crate::domain::series::{GraphItem, NewFileEntry, SeriesDelta, TagFiles};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Uniform `{result, body, msg}` envelope every endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub result: bool,
    #[serde(default = "Option::default")]
    pub body: Option<T>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub err_code: Option<i64>,
}

impl<T> ApiResponse<T> {
    pub fn success(body: T) -> Self {
        Self {
            result: true,
            body: Some(body),
            msg: None,
            err_code: None,
        }
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self {
            result: false,
            body: None,
            msg: Some(msg.into()),
            err_code: None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ApiResponse<U> {
        ApiResponse {
            result: self.result,
            body: self.body.map(f),
            msg: self.msg,
            err_code: self.err_code,
        }
    }

    pub fn message(&self) -> &str {
        self.msg.as_deref().unwrap_or("unknown error")
    }

    /// Folds a transport outcome into the envelope: any error becomes
    /// `result: false` naming the endpoint that failed.
    pub fn from_outcome(outcome: Result<Self, ApiError>) -> Self {
        match outcome {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("{}", e);
                Self::failure(format!("request failed: {}", e.endpoint()))
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("no backend base URL configured yet for {endpoint}")]
    NoBaseUrl { endpoint: String },
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ApiError {
    pub fn endpoint(&self) -> &str {
        match self {
            ApiError::NoBaseUrl { endpoint }
            | ApiError::Transport { endpoint, .. }
            | ApiError::Status { endpoint, .. }
            | ApiError::Decode { endpoint, .. } => endpoint,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFileRequest {
    pub append: bool,
    pub path_list: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileListBody {
    #[serde(default)]
    pub data: Vec<TagFiles>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarDataRequest {
    pub graph_list: Vec<GraphItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalarDataBody {
    #[serde(default)]
    pub data: Vec<SeriesDelta>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewFileBody {
    #[serde(default)]
    pub data: Vec<NewFileEntry>,
}

#[async_trait]
pub trait ScalarApi: Send + Sync {
    /// Points the client at the backend announced by the host.
    fn set_base_url(&self, url: &str);

    fn base_url(&self) -> Option<String>;

    /// Parse the given paths; `append` keeps what the backend already tracks
    async fn import_file(
        &self,
        request: &ImportFileRequest,
    ) -> Result<ApiResponse<FileListBody>, ApiError>;

    /// Points past the offsets of each requested graph
    async fn get_scalar_data(
        &self,
        request: &ScalarDataRequest,
    ) -> Result<ApiResponse<ScalarDataBody>, ApiError>;

    /// Files that appeared under watched directories since the last call
    async fn get_add_files(&self) -> Result<ApiResponse<NewFileBody>, ApiError>;

    async fn get_all_graph(&self) -> Result<ApiResponse<FileListBody>, ApiError>;
}

// HTTP client for the scalar plugin backend
use crate::application::scalar_api::{
    ApiError, ApiResponse, FileListBody, ImportFileRequest, NewFileBody, ScalarApi,
    ScalarDataBody, ScalarDataRequest,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

pub const IMPORT_FILE: &str = "/ScalarVisually/ImportFile";
pub const GET_SCALAR_DATA: &str = "/ScalarVisually/GetScalarData";
pub const GET_ADD_FILES: &str = "/ScalarVisually/GetAddFiles";
pub const GET_ALL_GRAPH: &str = "/ScalarVisually/GetAllGraph";

#[derive(Debug)]
pub struct ScalarHttpClient {
    client: reqwest::Client,
    base_url: RwLock<Option<String>>,
}

/// The host hands out a websocket address; the HTTP API lives on the same
/// authority. `ws` maps to `http`, every other scheme to `https`.
pub fn normalize_base_url(url: &str) -> String {
    let (scheme, rest) = match url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("", url),
    };
    let scheme = if scheme == "ws" { "http" } else { "https" };
    format!("{}://{}", scheme, rest.trim_end_matches('/'))
}

impl ScalarHttpClient {
    pub fn new(timeout: Duration, base_url: Option<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: RwLock::new(base_url.map(|url| url.trim_end_matches('/').to_string())),
        })
    }

    async fn post<B, T>(&self, endpoint: &str, body: Option<&B>) -> Result<ApiResponse<T>, ApiError>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let Some(base) = self.base_url() else {
            return Err(ApiError::NoBaseUrl {
                endpoint: endpoint.to_string(),
            });
        };
        let url = format!("{}{}", base, endpoint);

        let payload = match body {
            Some(body) => serde_json::to_string(body).map_err(|e| ApiError::Decode {
                endpoint: endpoint.to_string(),
                source: e,
            })?,
            None => String::new(),
        };

        // The backend reads raw text bodies
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(payload)
            .send()
            .await
            .map_err(|e| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            })?;

        if !response.status().is_success() {
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: response.status().as_u16(),
            });
        }

        let text = response.text().await.map_err(|e| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        tracing::debug!("{} answered {} bytes", endpoint, text.len());

        serde_json::from_str(&text).map_err(|e| ApiError::Decode {
            endpoint: endpoint.to_string(),
            source: e,
        })
    }
}

#[async_trait]
impl ScalarApi for ScalarHttpClient {
    fn set_base_url(&self, url: &str) {
        let normalized = normalize_base_url(url);
        tracing::info!("Backend base URL set to {}", normalized);
        *self
            .base_url
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(normalized);
    }

    fn base_url(&self) -> Option<String> {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn import_file(
        &self,
        request: &ImportFileRequest,
    ) -> Result<ApiResponse<FileListBody>, ApiError> {
        self.post(IMPORT_FILE, Some(request)).await
    }

    async fn get_scalar_data(
        &self,
        request: &ScalarDataRequest,
    ) -> Result<ApiResponse<ScalarDataBody>, ApiError> {
        self.post(GET_SCALAR_DATA, Some(request)).await
    }

    async fn get_add_files(&self) -> Result<ApiResponse<NewFileBody>, ApiError> {
        self.post::<(), _>(GET_ADD_FILES, None).await
    }

    async fn get_all_graph(&self) -> Result<ApiResponse<FileListBody>, ApiError> {
        self.post::<(), _>(GET_ALL_GRAPH, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("ws://127.0.0.1:9000"), "http://127.0.0.1:9000");
        assert_eq!(normalize_base_url("wss://host/"), "https://host");
        assert_eq!(normalize_base_url("host:9000"), "https://host:9000");
    }

    #[tokio::test]
    async fn test_import_file_round_trip() {
        let router = Router::new().route(
            IMPORT_FILE,
            post(|body: String| async move {
                let request: ImportFileRequest = serde_json::from_str(&body).unwrap();
                let tag = if request.append { "appended" } else { "fresh" };
                format!(
                    r#"{{"result":true,"body":{{"data":[{{"tag":"{}","fileList":[{{"name":"a","path":"{}"}}]}}]}}}}"#,
                    tag, request.path_list[0]
                )
            }),
        );
        let base = serve(router).await;
        let client = ScalarHttpClient::new(Duration::from_secs(5), Some(base)).unwrap();

        let response = client
            .import_file(&ImportFileRequest {
                append: false,
                path_list: vec!["runs/a.log".into()],
            })
            .await
            .unwrap();

        let body = response.body.unwrap();
        assert_eq!(body.data[0].tag, "fresh");
        assert_eq!(body.data[0].file_list[0].path, "runs/a.log");
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let router = Router::new().route(
            GET_ADD_FILES,
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(router).await;
        let client = ScalarHttpClient::new(Duration::from_secs(5), Some(base)).unwrap();

        let err = client.get_add_files().await.unwrap_err();

        assert!(matches!(err, ApiError::Status { status: 500, .. }));
        assert_eq!(err.endpoint(), GET_ADD_FILES);
    }

    #[tokio::test]
    async fn test_missing_base_url() {
        let client = ScalarHttpClient::new(Duration::from_secs(1), None).unwrap();
        let err = client.get_all_graph().await.unwrap_err();
        assert!(matches!(err, ApiError::NoBaseUrl { .. }));

        client.set_base_url("ws://localhost:1234");
        assert_eq!(client.base_url().as_deref(), Some("http://localhost:1234"));
    }

    #[tokio::test]
    async fn test_undecodable_body() {
        let router = Router::new().route(GET_ALL_GRAPH, post(|| async { "not json" }));
        let base = serve(router).await;
        let client = ScalarHttpClient::new(Duration::from_secs(5), Some(base)).unwrap();

        let err = client.get_all_graph().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode { .. }));
    }
}

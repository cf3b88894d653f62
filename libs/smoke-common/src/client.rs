//! HTTP catalog backed by the Compiler Explorer REST API
//!
//! - `GET  /api/compilers/{lang}` lists compilers (JSON, selected fields only)
//! - `POST /api/compiler/{id}/compile` compiles, or executes when
//!   `executorRequest` is set
//!
//! Connection failures and timeouts map to `ServiceUnavailable`; bad status
//! codes and undecodable bodies map to `ServiceError`.

use crate::catalog::{CatalogError, CompilerCatalog};
use crate::config::Config;
use crate::types::{CompileFilters, CompilerDescriptor, LanguageId, RawOutcome, ResultLine};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

const COMPILER_FIELDS: &str = "id,name,lang,semver,supportsExecute";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiCompiler {
    id: String,
    name: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(default)]
    semver: Option<String>,
    #[serde(default)]
    supports_execute: bool,
}

#[derive(Debug, Deserialize)]
struct ApiLine {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    code: i32,
    #[serde(default)]
    stdout: Vec<ApiLine>,
    #[serde(default)]
    stderr: Vec<ApiLine>,
}

impl ApiCompiler {
    fn into_descriptor(self, requested: &LanguageId) -> CompilerDescriptor {
        CompilerDescriptor {
            id: self.id,
            display_name: self.name,
            language: self.lang.map(LanguageId::new).unwrap_or_else(|| requested.clone()),
            semver: self.semver,
            supports_execution: self.supports_execute,
        }
    }
}

impl From<ApiResult> for RawOutcome {
    fn from(result: ApiResult) -> Self {
        let lines = |v: Vec<ApiLine>| -> Vec<ResultLine> { v.into_iter().map(|l| ResultLine { text: l.text }).collect() };
        RawOutcome {
            exit_code: result.code,
            stdout: lines(result.stdout),
            stderr: lines(result.stderr),
        }
    }
}

/// Build the JSON body of a compile/execute request
pub fn compile_request_body(
    compiler: &CompilerDescriptor,
    source_code: &str,
    filters: Option<&CompileFilters>,
    execute: bool,
) -> Value {
    let mut filter_json = json!({ "execute": execute });
    if let Some(f) = filters {
        filter_json["directives"] = json!(f.directives);
        filter_json["labels"] = json!(f.labels);
        filter_json["commentOnly"] = json!(f.comment_only);
        filter_json["libraryCode"] = json!(f.library_code);
    }

    json!({
        "source": source_code,
        "compiler": compiler.id,
        "lang": compiler.language.as_str(),
        "options": {
            "userArguments": "",
            "compilerOptions": { "executorRequest": execute },
            "filters": filter_json,
            "tools": [],
            "libraries": [],
        },
        "allowStoreCodeDebug": true,
    })
}

fn map_transport_error(e: reqwest::Error) -> CatalogError {
    if e.is_connect() || e.is_timeout() {
        CatalogError::ServiceUnavailable(e.to_string())
    } else {
        CatalogError::ServiceError(e.to_string())
    }
}

pub struct CompilerExplorerClient {
    http: reqwest::Client,
    base_url: String,
}

impl CompilerExplorerClient {
    pub fn new(config: &Config) -> Result<Self, CatalogError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("smoke-runner/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::ServiceError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn compilers_url(&self, language: &LanguageId) -> String {
        format!("{}/api/compilers/{}", self.base_url, language)
    }

    pub fn compile_url(&self, compiler: &CompilerDescriptor) -> String {
        format!("{}/api/compiler/{}/compile", self.base_url, compiler.id)
    }

    async fn submit(&self, compiler: &CompilerDescriptor, body: Value) -> Result<RawOutcome, CatalogError> {
        let url = self.compile_url(compiler);
        debug!(compiler_id = %compiler.id, %url, "Submitting request");

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::ServiceError(format!("{} returned HTTP {}", url, status)));
        }

        let result: ApiResult = response
            .json()
            .await
            .map_err(|e| CatalogError::ServiceError(format!("Malformed result from {}: {}", url, e)))?;

        Ok(result.into())
    }
}

#[async_trait]
impl CompilerCatalog for CompilerExplorerClient {
    async fn list_compilers(&self, language: &LanguageId) -> Result<Vec<CompilerDescriptor>, CatalogError> {
        let url = self.compilers_url(language);

        let response = self
            .http
            .get(&url)
            .query(&[("fields", COMPILER_FIELDS)])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::ServiceError(format!("{} returned HTTP {}", url, status)));
        }

        let compilers: Vec<ApiCompiler> = response
            .json()
            .await
            .map_err(|e| CatalogError::ServiceError(format!("Malformed compiler list: {}", e)))?;

        debug!(%language, count = compilers.len(), "Fetched compiler list");

        Ok(compilers.into_iter().map(|c| c.into_descriptor(language)).collect())
    }

    async fn compile(
        &self,
        compiler: &CompilerDescriptor,
        source_code: &str,
        filters: &CompileFilters,
    ) -> Result<RawOutcome, CatalogError> {
        let body = compile_request_body(compiler, source_code, Some(filters), false);
        self.submit(compiler, body).await
    }

    async fn execute(&self, compiler: &CompilerDescriptor, source_code: &str) -> Result<RawOutcome, CatalogError> {
        let body = compile_request_body(compiler, source_code, None, true);
        self.submit(compiler, body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local_client(base_url: String) -> CompilerExplorerClient {
        CompilerExplorerClient {
            http: reqwest::Client::builder().no_proxy().build().unwrap(),
            base_url,
        }
    }

    /// Accept one connection, read the request head and answer with `response`
    async fn serve_once(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{}", addr)
    }

    fn gcc() -> CompilerDescriptor {
        CompilerDescriptor {
            id: "g101".to_string(),
            display_name: "x86-64 gcc 10.1".to_string(),
            language: LanguageId::from("c++"),
            semver: Some("10.1".to_string()),
            supports_execution: true,
        }
    }

    #[test]
    fn test_urls() {
        let config = Config {
            api_url: "https://godbolt.org/".to_string(),
            ..Config::default()
        };
        let client = CompilerExplorerClient::new(&config).unwrap();

        assert_eq!(client.compilers_url(&LanguageId::from("c++")), "https://godbolt.org/api/compilers/c++");
        assert_eq!(client.compile_url(&gcc()), "https://godbolt.org/api/compiler/g101/compile");
    }

    #[test]
    fn test_compiler_list_decoding() {
        let payload = r#"[
            {"id": "g101", "name": "x86-64 gcc 10.1", "lang": "c++", "semver": "10.1", "supportsExecute": true},
            {"id": "armg640", "name": "ARM gcc 6.4", "lang": "c++", "semver": "6.4"},
            {"id": "flangtrunk", "name": "flang-trunk", "supportsExecute": false}
        ]"#;
        let compilers: Vec<ApiCompiler> = serde_json::from_str(payload).unwrap();
        let requested = LanguageId::from("fortran");
        let descriptors: Vec<_> = compilers.into_iter().map(|c| c.into_descriptor(&requested)).collect();

        assert_eq!(descriptors[0], gcc());
        assert!(!descriptors[1].supports_execution);
        assert_eq!(descriptors[2].language, requested);
        assert_eq!(descriptors[2].semver, None);
    }

    #[test]
    fn test_result_decoding_keeps_line_text() {
        let payload = r#"{
            "code": 123,
            "stdout": [{"text": "hello world"}],
            "stderr": [],
            "didExecute": true
        }"#;
        let result: ApiResult = serde_json::from_str(payload).unwrap();
        let outcome: RawOutcome = result.into();

        assert_eq!(outcome.exit_code, 123);
        assert_eq!(outcome.stdout_texts(), vec!["hello world"]);
        assert!(outcome.stderr.is_empty());
    }

    #[test]
    fn test_compile_body_forwards_filters() {
        let filters = CompileFilters {
            directives: true,
            labels: false,
            comment_only: true,
            library_code: false,
        };
        let body = compile_request_body(&gcc(), "int main() {}", Some(&filters), false);

        assert_eq!(body["compiler"], "g101");
        assert_eq!(body["lang"], "c++");
        assert_eq!(body["options"]["compilerOptions"]["executorRequest"], false);
        assert_eq!(body["options"]["filters"]["directives"], true);
        assert_eq!(body["options"]["filters"]["labels"], false);
        assert_eq!(body["options"]["filters"]["commentOnly"], true);
        assert_eq!(body["options"]["filters"]["libraryCode"], false);
    }

    #[test]
    fn test_execute_body_requests_executor() {
        let body = compile_request_body(&gcc(), "int main() { return 123; }", None, true);

        assert_eq!(body["options"]["compilerOptions"]["executorRequest"], true);
        assert_eq!(body["options"]["filters"]["execute"], true);
        assert_eq!(body["source"], "int main() { return 123; }");
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let client = local_client("http://127.0.0.1:1".to_string());

        let err = client.list_compilers(&LanguageId::from("c++")).await.unwrap_err();
        assert!(matches!(err, CatalogError::ServiceUnavailable(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_error_status_is_service_error() {
        let base = serve_once("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n").await;
        let client = local_client(base);

        let err = client.list_compilers(&LanguageId::from("pascal")).await.unwrap_err();
        match err {
            CatalogError::ServiceError(message) => assert!(message.contains("500"), "got {}", message),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_list_is_service_error() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot json!",
        )
        .await;
        let client = local_client(base);

        let err = client.list_compilers(&LanguageId::from("go")).await.unwrap_err();
        assert!(matches!(err, CatalogError::ServiceError(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_list_compilers_over_http() {
        let base = serve_once(concat!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 68\r\nConnection: close\r\n\r\n",
            r#"[{"id":"dmd2","name":"dmd 2.095","lang":"d","supportsExecute":true}]"#,
        ))
        .await;
        let client = local_client(base);

        let compilers = client.list_compilers(&LanguageId::from("d")).await.unwrap();
        assert_eq!(compilers.len(), 1);
        assert_eq!(compilers[0].id, "dmd2");
        assert!(compilers[0].supports_execution);
    }
}

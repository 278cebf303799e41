//! OpenAI vector store and assistants binding.
//!
//! Talks to the REST API directly with reqwest.
//! API reference: https://platform.openai.com/docs/api-reference/vector-stores

use crate::client::{AssistantService, IndexService};
use crate::types::{
    AssistantHandle, AssistantSpec, DocumentRef, IndexSummary, IngestionStatus, Page, RunRef,
    RunStatus,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vsctl_core::{AppError, AppResult, Credential};

/// Page size used for every cursor-paginated listing.
const PAGE_LIMIT: u32 = 100;

/// Per-request timeout. Long-running jobs are polled, never awaited in one request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `{ "object": "list", "data": [...], "has_more": bool, "last_id": ... }`
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    last_id: Option<String>,
}

impl<T> ListResponse<T> {
    fn into_page<U>(self, convert: impl Fn(T) -> U) -> Page<U> {
        let next_cursor = if self.has_more { self.last_id } else { None };
        Page {
            items: self.data.into_iter().map(convert).collect(),
            next_cursor,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VectorStore {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    file_counts: FileCounts,
}

#[derive(Debug, Default, Deserialize)]
struct FileCounts {
    #[serde(default)]
    total: u64,
}

#[derive(Debug, Deserialize)]
struct VectorStoreFile {
    id: String,
    status: String,
    #[serde(default)]
    last_error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ApiErrorDetail {
    fn describe(&self) -> String {
        match (&self.code, &self.message) {
            (Some(code), Some(message)) => format!("{}: {}", code, message),
            (None, Some(message)) => message.clone(),
            (Some(code), None) => code.clone(),
            (None, None) => "no details reported".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Run {
    id: String,
    thread_id: String,
    status: String,
    #[serde(default)]
    last_error: Option<ApiErrorDetail>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Vec<MessageContent>,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<MessageText>,
}

#[derive(Debug, Deserialize)]
struct MessageText {
    value: String,
}

#[derive(Debug, Serialize)]
struct CreateVectorStoreRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AttachFileRequest<'a> {
    file_id: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ToolResources<'a> {
    file_search: FileSearchResources<'a>,
}

#[derive(Debug, Serialize)]
struct FileSearchResources<'a> {
    vector_store_ids: [&'a str; 1],
}

impl<'a> ToolResources<'a> {
    fn for_index(index_id: &'a str) -> Self {
        Self {
            file_search: FileSearchResources {
                vector_store_ids: [index_id],
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateAssistantRequest<'a> {
    name: &'a str,
    instructions: &'a str,
    model: &'a str,
    tools: [Tool; 1],
    tool_resources: ToolResources<'a>,
}

#[derive(Debug, Serialize)]
struct ModifyAssistantRequest<'a> {
    tool_resources: ToolResources<'a>,
}

#[derive(Debug, Serialize)]
struct CreateThreadAndRunRequest<'a> {
    assistant_id: &'a str,
    thread: NewThread<'a>,
}

#[derive(Debug, Serialize)]
struct NewThread<'a> {
    messages: [NewMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct NewMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// OpenAI REST client.
pub struct OpenAiClient {
    /// Base URL, without trailing slash (e.g. https://api.openai.com/v1)
    base_url: String,

    /// Operator credential, held in memory only
    credential: Credential,

    /// HTTP client
    client: reqwest::Client,
}

impl OpenAiClient {
    /// Create a client against a custom base URL.
    pub fn with_base_url(base_url: impl Into<String>, credential: Credential) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credential,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(self.credential.expose())
            .header("OpenAI-Beta", "assistants=v2")
    }

    /// Send a request and turn non-success statuses into typed errors.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> AppResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| AppError::api(None, format!("{}: {}", context, e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let message = error_message(&body);

        Err(match status.as_u16() {
            401 | 403 => {
                AppError::InvalidCredential(format!("{} ({}): {}", context, status, message))
            }
            code => AppError::api(Some(code), format!("{} ({}): {}", context, status, message)),
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        context: &str,
    ) -> AppResult<T> {
        let response = self.send(request, context).await?;
        response
            .json()
            .await
            .map_err(|e| AppError::api(None, format!("{}: unexpected response: {}", context, e)))
    }
}

/// Pull the human-readable message out of an OpenAI error body.
fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => envelope.error.describe(),
        Err(_) if body.trim().is_empty() => "empty response body".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn convert_store(store: VectorStore) -> IndexSummary {
    IndexSummary {
        id: store.id,
        name: store.name,
        document_count: store.file_counts.total,
        status: store.status.unwrap_or_default(),
        created_at: store.created_at,
    }
}

fn convert_file_status(status: &str, last_error: Option<&ApiErrorDetail>) -> IngestionStatus {
    match status {
        "completed" => IngestionStatus::Completed,
        "cancelled" => IngestionStatus::Cancelled,
        "failed" => IngestionStatus::Failed(
            last_error
                .map(ApiErrorDetail::describe)
                .unwrap_or_else(|| "ingestion failed".to_string()),
        ),
        _ => IngestionStatus::InProgress,
    }
}

fn convert_file(file: VectorStoreFile) -> DocumentRef {
    let status = convert_file_status(&file.status, file.last_error.as_ref());
    DocumentRef {
        id: file.id,
        status,
    }
}

fn convert_run(run: &Run) -> RunStatus {
    match run.status.as_str() {
        "completed" => RunStatus::Completed,
        "queued" | "in_progress" | "cancelling" => RunStatus::Pending(run.status.clone()),
        other => {
            let reason = run
                .last_error
                .as_ref()
                .map(ApiErrorDetail::describe)
                .or_else(|| {
                    run.incomplete_details
                        .as_ref()
                        .and_then(|details| details.reason.clone())
                })
                .unwrap_or_else(|| format!("run ended with status '{}'", other));
            RunStatus::Failed {
                status: other.to_string(),
                reason,
            }
        }
    }
}

/// First text block of the newest assistant message.
fn extract_answer(messages: Vec<Message>) -> Option<String> {
    messages
        .into_iter()
        .find(|message| message.role == "assistant")
        .and_then(|message| {
            message
                .content
                .into_iter()
                .find(|content| content.kind == "text")
                .and_then(|content| content.text)
                .map(|text| text.value)
        })
}

fn page_query(after: Option<&str>) -> Vec<(&'static str, String)> {
    let mut query = vec![("limit", PAGE_LIMIT.to_string())];
    if let Some(after) = after {
        query.push(("after", after.to_string()));
    }
    query
}

#[async_trait::async_trait]
impl IndexService for OpenAiClient {
    fn provider_name(&self) -> &str {
        "openai"
    }

    async fn probe(&self) -> AppResult<()> {
        tracing::debug!("Probing OpenAI credential {}", self.credential.hint());
        let request = self
            .request(reqwest::Method::GET, "vector_stores")
            .query(&[("limit", "1")]);
        let _: ListResponse<VectorStore> = self
            .send_json(request, "Failed to list vector stores")
            .await?;
        Ok(())
    }

    async fn list_indexes(&self, after: Option<&str>) -> AppResult<Page<IndexSummary>> {
        let request = self
            .request(reqwest::Method::GET, "vector_stores")
            .query(&page_query(after));
        let list: ListResponse<VectorStore> =
            self.send_json(request, "Failed to list vector stores").await?;
        Ok(list.into_page(convert_store))
    }

    async fn get_index(&self, index_id: &str) -> AppResult<IndexSummary> {
        let request = self.request(reqwest::Method::GET, &format!("vector_stores/{}", index_id));
        match self
            .send_json::<VectorStore>(request, "Failed to retrieve vector store")
            .await
        {
            Ok(store) => Ok(convert_store(store)),
            Err(e) if e.is_not_found() => Err(AppError::IndexNotFound(index_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn create_index(&self, name: Option<&str>) -> AppResult<IndexSummary> {
        tracing::info!("Creating vector store {:?}", name);
        let request = self
            .request(reqwest::Method::POST, "vector_stores")
            .json(&CreateVectorStoreRequest { name });
        let store: VectorStore = self
            .send_json(request, "Failed to create vector store")
            .await?;
        Ok(convert_store(store))
    }

    async fn delete_index(&self, index_id: &str) -> AppResult<()> {
        tracing::info!("Deleting vector store {}", index_id);
        let request = self.request(reqwest::Method::DELETE, &format!("vector_stores/{}", index_id));
        match self.send(request, "Failed to delete vector store").await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Err(AppError::IndexNotFound(index_id.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn list_documents(
        &self,
        index_id: &str,
        after: Option<&str>,
    ) -> AppResult<Page<DocumentRef>> {
        let request = self
            .request(
                reqwest::Method::GET,
                &format!("vector_stores/{}/files", index_id),
            )
            .query(&page_query(after));
        let list: ListResponse<VectorStoreFile> = self
            .send_json(request, "Failed to list vector store files")
            .await?;
        Ok(list.into_page(convert_file))
    }

    async fn detach_document(&self, index_id: &str, document_id: &str) -> AppResult<()> {
        let request = self.request(
            reqwest::Method::DELETE,
            &format!("vector_stores/{}/files/{}", index_id, document_id),
        );
        self.send(request, "Failed to detach file from vector store")
            .await?;
        Ok(())
    }

    async fn delete_blob(&self, blob_id: &str) -> AppResult<()> {
        let request = self.request(reqwest::Method::DELETE, &format!("files/{}", blob_id));
        self.send(request, "Failed to delete file").await?;
        Ok(())
    }

    async fn upload_blob(&self, file_name: &str, content: Vec<u8>) -> AppResult<String> {
        tracing::info!("Uploading {} ({} bytes)", file_name, content.len());
        let part = reqwest::multipart::Part::bytes(content)
            .file_name(file_name.to_string())
            .mime_str("text/plain")
            .map_err(|e| AppError::api(None, format!("Invalid upload part: {}", e)))?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("file", part);

        let request = self.request(reqwest::Method::POST, "files").multipart(form);
        let created: Created = self.send_json(request, "Failed to upload file").await?;
        Ok(created.id)
    }

    async fn attach_document(&self, index_id: &str, blob_id: &str) -> AppResult<DocumentRef> {
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("vector_stores/{}/files", index_id),
            )
            .json(&AttachFileRequest { file_id: blob_id });
        let file: VectorStoreFile = self
            .send_json(request, "Failed to attach file to vector store")
            .await?;
        Ok(convert_file(file))
    }

    async fn document_status(
        &self,
        index_id: &str,
        document_id: &str,
    ) -> AppResult<IngestionStatus> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("vector_stores/{}/files/{}", index_id, document_id),
        );
        let file: VectorStoreFile = self
            .send_json(request, "Failed to retrieve vector store file")
            .await?;
        Ok(convert_file(file).status)
    }
}

#[async_trait::async_trait]
impl AssistantService for OpenAiClient {
    async fn create_assistant(
        &self,
        spec: &AssistantSpec,
        index_id: &str,
    ) -> AppResult<AssistantHandle> {
        tracing::info!("Creating assistant '{}' on {}", spec.name, index_id);
        let request = self
            .request(reqwest::Method::POST, "assistants")
            .json(&CreateAssistantRequest {
                name: &spec.name,
                instructions: &spec.instructions,
                model: &spec.model,
                tools: [Tool {
                    kind: "file_search",
                }],
                tool_resources: ToolResources::for_index(index_id),
            });
        let created: Created = self
            .send_json(request, "Failed to create assistant")
            .await?;

        Ok(AssistantHandle {
            assistant_id: created.id,
            index_id: index_id.to_string(),
        })
    }

    async fn bind_assistant(&self, assistant_id: &str, index_id: &str) -> AppResult<()> {
        tracing::info!("Binding assistant {} to {}", assistant_id, index_id);
        let request = self
            .request(
                reqwest::Method::POST,
                &format!("assistants/{}", assistant_id),
            )
            .json(&ModifyAssistantRequest {
                tool_resources: ToolResources::for_index(index_id),
            });
        self.send(request, "Failed to update assistant").await?;
        Ok(())
    }

    async fn start_run(&self, assistant_id: &str, question: &str) -> AppResult<RunRef> {
        let request = self
            .request(reqwest::Method::POST, "threads/runs")
            .json(&CreateThreadAndRunRequest {
                assistant_id,
                thread: NewThread {
                    messages: [NewMessage {
                        role: "user",
                        content: question,
                    }],
                },
            });
        let run: Run = self.send_json(request, "Failed to start run").await?;
        tracing::debug!("Started run {} on thread {}", run.id, run.thread_id);

        Ok(RunRef {
            thread_id: run.thread_id,
            run_id: run.id,
        })
    }

    async fn run_status(&self, run: &RunRef) -> AppResult<RunStatus> {
        let request = self.request(
            reqwest::Method::GET,
            &format!("threads/{}/runs/{}", run.thread_id, run.run_id),
        );
        let run: Run = self.send_json(request, "Failed to retrieve run").await?;
        Ok(convert_run(&run))
    }

    async fn latest_answer(&self, thread_id: &str) -> AppResult<Option<String>> {
        let request = self
            .request(
                reqwest::Method::GET,
                &format!("threads/{}/messages", thread_id),
            )
            .query(&[("order", "desc"), ("limit", "20")]);
        let list: ListResponse<Message> = self
            .send_json(request, "Failed to list thread messages")
            .await?;
        Ok(extract_answer(list.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OpenAiClient {
        OpenAiClient::with_base_url(
            "https://api.openai.com/v1/",
            Credential::new("sk-test-0123456789").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_url_building() {
        let client = client();
        assert_eq!(client.provider_name(), "openai");
        assert_eq!(
            client.url("/vector_stores/vs_1"),
            "https://api.openai.com/v1/vector_stores/vs_1"
        );
    }

    #[test]
    fn test_vector_store_list_conversion() {
        let body = r#"{
            "object": "list",
            "data": [
                {"id": "vs_a", "object": "vector_store", "name": "catalog-v1", "status": "completed",
                 "created_at": 1700000000, "file_counts": {"total": 3, "completed": 3}},
                {"id": "vs_b", "object": "vector_store", "name": null, "created_at": 1700000001}
            ],
            "first_id": "vs_a",
            "last_id": "vs_b",
            "has_more": true
        }"#;
        let list: ListResponse<VectorStore> = serde_json::from_str(body).unwrap();
        let page = list.into_page(convert_store);

        assert_eq!(page.next_cursor.as_deref(), Some("vs_b"));
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].name.as_deref(), Some("catalog-v1"));
        assert_eq!(page.items[0].document_count, 3);
        assert_eq!(page.items[1].name, None);
        assert_eq!(page.items[1].document_count, 0);
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let body = r#"{"data": [], "last_id": null, "has_more": false}"#;
        let list: ListResponse<VectorStore> = serde_json::from_str(body).unwrap();
        assert_eq!(list.into_page(convert_store).next_cursor, None);
    }

    #[test]
    fn test_file_status_conversion() {
        let body = r#"{"id": "file-1", "status": "failed",
                       "last_error": {"code": "unsupported_file", "message": "bad type"}}"#;
        let file: VectorStoreFile = serde_json::from_str(body).unwrap();
        let document = convert_file(file);
        assert_eq!(document.id, "file-1");
        assert_eq!(
            document.status,
            IngestionStatus::Failed("unsupported_file: bad type".to_string())
        );

        assert_eq!(convert_file_status("in_progress", None), IngestionStatus::InProgress);
        assert_eq!(convert_file_status("completed", None), IngestionStatus::Completed);
        assert_eq!(convert_file_status("cancelled", None), IngestionStatus::Cancelled);
    }

    #[test]
    fn test_run_status_conversion() {
        let run: Run = serde_json::from_str(
            r#"{"id": "run_1", "thread_id": "thread_1", "status": "in_progress"}"#,
        )
        .unwrap();
        assert_eq!(convert_run(&run), RunStatus::Pending("in_progress".to_string()));

        let run: Run = serde_json::from_str(
            r#"{"id": "run_1", "thread_id": "thread_1", "status": "failed",
                "last_error": {"code": "rate_limit_exceeded", "message": "slow down"}}"#,
        )
        .unwrap();
        assert_eq!(
            convert_run(&run),
            RunStatus::Failed {
                status: "failed".to_string(),
                reason: "rate_limit_exceeded: slow down".to_string(),
            }
        );

        let run: Run = serde_json::from_str(
            r#"{"id": "run_1", "thread_id": "thread_1", "status": "incomplete",
                "incomplete_details": {"reason": "max_completion_tokens"}}"#,
        )
        .unwrap();
        assert!(matches!(
            convert_run(&run),
            RunStatus::Failed { ref reason, .. } if reason == "max_completion_tokens"
        ));

        let run: Run = serde_json::from_str(
            r#"{"id": "run_1", "thread_id": "thread_1", "status": "expired"}"#,
        )
        .unwrap();
        assert!(matches!(
            convert_run(&run),
            RunStatus::Failed { ref status, .. } if status == "expired"
        ));
    }

    #[test]
    fn test_extract_answer_skips_user_messages() {
        let body = r#"{"data": [
            {"role": "assistant", "content": [
                {"type": "image_file", "image_file": {"file_id": "file-x"}},
                {"type": "text", "text": {"value": "Forty-two.", "annotations": []}}
            ]},
            {"role": "user", "content": [{"type": "text", "text": {"value": "What is it?"}}]}
        ], "has_more": false}"#;
        let list: ListResponse<Message> = serde_json::from_str(body).unwrap();
        assert_eq!(extract_answer(list.data), Some("Forty-two.".to_string()));

        let body = r#"{"data": [{"role": "user", "content": []}]}"#;
        let list: ListResponse<Message> = serde_json::from_str(body).unwrap();
        assert_eq!(extract_answer(list.data), None);
    }

    #[test]
    fn test_error_message_extraction() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error", "code": "invalid_api_key"}}"#;
        assert_eq!(
            error_message(body),
            "invalid_api_key: Incorrect API key provided"
        );
        assert_eq!(error_message("upstream timeout"), "upstream timeout");
        assert_eq!(error_message(""), "empty response body");
    }

    #[test]
    fn test_assistant_request_shape() {
        let request = CreateAssistantRequest {
            name: "RAG Assistant",
            instructions: "Use the provided information.",
            model: "gpt-3.5-turbo",
            tools: [Tool {
                kind: "file_search",
            }],
            tool_resources: ToolResources::for_index("vs_1"),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["tools"][0]["type"], "file_search");
        assert_eq!(
            value["tool_resources"]["file_search"]["vector_store_ids"][0],
            "vs_1"
        );
    }

    #[test]
    fn test_unnamed_store_request_omits_name() {
        let value = serde_json::to_value(CreateVectorStoreRequest { name: None }).unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}

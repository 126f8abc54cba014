use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use el_analyzer::{
    argument_hints, complete, hover, lint, parse, ArgumentHint, Bias, Completion, CompletionKind,
    CompletionRequest, Diagnostic as ElDiagnostic, Schema, Selection, Severity,
};
use serde::Deserialize;
use tokio::{
    sync::Mutex,
    task,
    time::{sleep, Duration},
};
use tokio_util::sync::CancellationToken;
use tower_lsp::jsonrpc;
use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, CompletionList, CompletionOptions, CompletionParams,
    CompletionResponse, CompletionTextEdit, CompletionTriggerKind, Diagnostic as LspDiagnostic,
    DiagnosticSeverity, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, Documentation, Hover, HoverContents, HoverParams,
    HoverProviderCapability, InitializeParams, InitializeResult, InitializedParams,
    InsertTextFormat, MarkupContent, MarkupKind, MessageType, ParameterInformation,
    ParameterLabel, Position, Range, ServerCapabilities, ServerInfo, SignatureHelp,
    SignatureHelpOptions, SignatureHelpParams, SignatureInformation, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextEdit, Url, WorkDoneProgressOptions,
};
use tower_lsp::{async_trait, Client, LanguageServer, LspService, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_DEBOUNCE_MS: u64 = 150;
const DIAGNOSTIC_SOURCE: &str = "el";

/// `initializationOptions` accepted from the client.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InitializationOptions {
    #[serde(default)]
    schema: Option<Schema>,
    #[serde(default)]
    schema_path: Option<PathBuf>,
    #[serde(default)]
    debounce_ms: Option<u64>,
}

impl InitializationOptions {
    fn from_value(value: Option<serde_json::Value>) -> Result<Self> {
        match value {
            None | Some(serde_json::Value::Null) => Ok(Self::default()),
            Some(value) => {
                serde_json::from_value(value).context("invalid initialization options")
            }
        }
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE_MS))
    }

    /// Inline schema wins over `schemaPath`; neither means an empty schema.
    fn into_schema(self) -> Result<Schema> {
        if let Some(schema) = self.schema {
            schema.validate().context("invalid inline schema")?;
            return Ok(schema);
        }
        match self.schema_path {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read schema {}", path.display()))?;
                Schema::from_file_contents(&path, &contents)
                    .with_context(|| format!("failed to load schema from {}", path.display()))
            }
            None => Ok(Schema::default()),
        }
    }
}

#[derive(Debug, Clone)]
struct DocumentState {
    text: String,
    version: i32,
    pending: Option<PendingLint>,
}

#[derive(Debug, Clone)]
struct PendingLint {
    id: u64,
    token: CancellationToken,
}

#[derive(Debug)]
struct ServerState {
    documents: HashMap<Url, DocumentState>,
    next_task_id: u64,
    schema: Arc<Schema>,
    debounce: Duration,
    startup_error: Option<String>,
}

impl Default for ServerState {
    fn default() -> Self {
        Self {
            documents: HashMap::new(),
            next_task_id: 0,
            schema: Arc::new(Schema::default()),
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            startup_error: None,
        }
    }
}

/// Byte offsets of line starts, for converting analyzer offsets to LSP
/// positions and back. Columns count characters.
#[derive(Debug, Clone)]
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let line_starts = std::iter::once(0)
            .chain(
                text.bytes()
                    .enumerate()
                    .filter(|(_, byte)| *byte == b'\n')
                    .map(|(index, _)| index + 1),
            )
            .collect();
        Self { line_starts }
    }

    fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(text.len());
        let line = self
            .line_starts
            .partition_point(|start| *start <= offset)
            .saturating_sub(1);
        let line_start = self.line_starts.get(line).copied().unwrap_or(0);
        let character = text
            .get(line_start..offset)
            .map_or(0, |prefix| prefix.chars().count());
        Position {
            line: line as u32,
            character: character as u32,
        }
    }

    fn offset(&self, text: &str, position: &Position) -> Option<usize> {
        let line = position.line as usize;
        let line_start = *self.line_starts.get(line)?;
        let line_end = self
            .line_starts
            .get(line + 1)
            .copied()
            .unwrap_or(text.len());
        let line_text = text.get(line_start..line_end)?;
        line_text
            .char_indices()
            .map(|(index, _)| line_start + index)
            .chain(std::iter::once(line_end))
            .nth(position.character as usize)
    }

    fn range(&self, text: &str, from: usize, to: usize) -> Range {
        Range {
            start: self.position(text, from),
            end: self.position(text, to),
        }
    }
}

#[derive(Clone)]
struct ElLanguageServer {
    client: Client,
    state: Arc<Mutex<ServerState>>,
}

impl ElLanguageServer {
    fn new(client: Client) -> Self {
        Self {
            client,
            state: Arc::new(Mutex::new(ServerState::default())),
        }
    }

    /// Current text of `uri` together with the schema it is analyzed against.
    async fn document_snapshot(&self, uri: &Url) -> Option<(String, Arc<Schema>)> {
        let state = self.state.lock().await;
        let doc = state.documents.get(uri)?;
        Some((doc.text.clone(), state.schema.clone()))
    }

    async fn upsert_document(&self, uri: &Url, text: String, version: i32) {
        let mut state = self.state.lock().await;
        if let Some(doc) = state.documents.get_mut(uri) {
            doc.text = text;
            doc.version = version;
            if let Some(pending) = doc.pending.take() {
                pending.token.cancel();
            }
            return;
        }
        state.documents.insert(
            uri.clone(),
            DocumentState {
                text,
                version,
                pending: None,
            },
        );
    }

    async fn remove_document(&self, uri: &Url) {
        let mut state = self.state.lock().await;
        if let Some(doc) = state.documents.remove(uri) {
            if let Some(pending) = doc.pending {
                pending.token.cancel();
            }
        }
    }

    /// Lints `uri` after the debounce delay unless a newer edit supersedes it.
    async fn schedule_lint(&self, uri: Url, version: i32) {
        let (token, task_id, debounce) = {
            let mut state = self.state.lock().await;
            let task_id = state.next_task_id;
            state.next_task_id = state.next_task_id.saturating_add(1);
            let debounce = state.debounce;
            let Some(doc) = state.documents.get_mut(&uri) else {
                return;
            };
            if let Some(pending) = doc.pending.take() {
                pending.token.cancel();
            }
            let token = CancellationToken::new();
            doc.pending = Some(PendingLint {
                id: task_id,
                token: token.clone(),
            });
            (token, task_id, debounce)
        };

        let server = self.clone();
        task::spawn_local(async move {
            sleep(debounce).await;
            if token.is_cancelled() {
                return;
            }
            tracing::debug!(%uri, version, task_id, "lint:start");
            server.run_lint_task(uri, version, task_id, token).await;
        });
    }

    async fn run_lint_task(&self, uri: Url, version: i32, task_id: u64, token: CancellationToken) {
        {
            let state = self.state.lock().await;
            match state.documents.get(&uri) {
                Some(doc)
                    if doc.version == version
                        && doc
                            .pending
                            .as_ref()
                            .is_some_and(|pending| pending.id == task_id) => {}
                _ => return,
            }
        }

        if let Err(err) = self.lint_and_publish(&uri, Some(&token)).await {
            self.client
                .log_message(MessageType::ERROR, format!("lint failed for {uri}: {err}"))
                .await;
        }

        let mut state = self.state.lock().await;
        if let Some(doc) = state.documents.get_mut(&uri) {
            if doc
                .pending
                .as_ref()
                .is_some_and(|pending| pending.id == task_id)
            {
                doc.pending = None;
            }
        }
    }

    async fn lint_and_publish(&self, uri: &Url, cancel: Option<&CancellationToken>) -> Result<()> {
        let (text, version, schema) = {
            let state = self.state.lock().await;
            let Some(doc) = state.documents.get(uri) else {
                return Ok(());
            };
            (doc.text.clone(), doc.version, state.schema.clone())
        };

        if Self::cancellation_requested(cancel) {
            return Ok(());
        }

        let (text, diagnostics) = task::spawn_blocking(move || {
            let diagnostics = lint(&parse(&text), &schema);
            (text, diagnostics)
        })
        .await
        .context("lint task panicked")?;

        if Self::cancellation_requested(cancel) {
            tracing::debug!(%uri, version, "lint:cancelled");
            return Ok(());
        }

        {
            let state = self.state.lock().await;
            if state.documents.get(uri).map(|doc| doc.version) != Some(version) {
                return Ok(());
            }
        }

        let index = LineIndex::new(&text);
        let diagnostics: Vec<LspDiagnostic> = diagnostics
            .iter()
            .map(|diagnostic| convert_diagnostic(&text, &index, diagnostic))
            .collect();
        tracing::debug!(%uri, version, count = diagnostics.len(), "lint:finish");
        self.client
            .publish_diagnostics(uri.clone(), diagnostics, Some(version))
            .await;
        Ok(())
    }

    async fn relint_all(&self) {
        let documents: Vec<(Url, i32)> = {
            let state = self.state.lock().await;
            state
                .documents
                .iter()
                .map(|(uri, doc)| (uri.clone(), doc.version))
                .collect()
        };
        for (uri, version) in documents {
            self.schedule_lint(uri, version).await;
        }
    }

    #[inline]
    fn cancellation_requested(token: Option<&CancellationToken>) -> bool {
        token.is_some_and(|token| token.is_cancelled())
    }
}

fn apply_content_change(text: &mut String, range: Option<Range>, new_text: &str) -> Result<()> {
    match range {
        None => {
            text.clear();
            text.push_str(new_text);
            Ok(())
        }
        Some(range) => {
            let index = LineIndex::new(text);
            let start = index
                .offset(text, &range.start)
                .ok_or_else(|| anyhow!("invalid start position in change range"))?;
            let end = index
                .offset(text, &range.end)
                .ok_or_else(|| anyhow!("invalid end position in change range"))?;

            if end < start {
                anyhow::bail!("change range end precedes start");
            }

            text.replace_range(start..end, new_text);
            Ok(())
        }
    }
}

fn convert_diagnostic(text: &str, index: &LineIndex, diagnostic: &ElDiagnostic) -> LspDiagnostic {
    let severity = match diagnostic.severity {
        Severity::Error => DiagnosticSeverity::ERROR,
        Severity::Warning => DiagnosticSeverity::WARNING,
    };
    LspDiagnostic {
        range: index.range(text, diagnostic.from, diagnostic.to),
        severity: Some(severity),
        source: Some(DIAGNOSTIC_SOURCE.into()),
        message: diagnostic.message.clone(),
        ..Default::default()
    }
}

fn completion_item_kind(kind: CompletionKind) -> CompletionItemKind {
    match kind {
        CompletionKind::Variable => CompletionItemKind::VARIABLE,
        CompletionKind::Function => CompletionItemKind::FUNCTION,
        CompletionKind::Keyword => CompletionItemKind::KEYWORD,
        CompletionKind::Property => CompletionItemKind::PROPERTY,
        CompletionKind::Method => CompletionItemKind::METHOD,
    }
}

fn escape_snippet(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('$', "\\$")
        .replace('}', "\\}")
}

/// Places the caret where the completion wants it through a `$0` tab stop.
fn completion_item(completion: &Completion, range: Range) -> CompletionItem {
    let insert_text = &completion.insert_text;
    let split = insert_text
        .get(..completion.cursor_offset)
        .zip(insert_text.get(completion.cursor_offset..))
        .filter(|(_, tail)| !tail.is_empty());
    let (new_text, format) = match split {
        Some((head, tail)) => (
            format!("{}$0{}", escape_snippet(head), escape_snippet(tail)),
            InsertTextFormat::SNIPPET,
        ),
        None => (insert_text.clone(), InsertTextFormat::PLAIN_TEXT),
    };

    CompletionItem {
        label: completion.label.clone(),
        kind: Some(completion_item_kind(completion.kind)),
        detail: completion.detail.clone(),
        documentation: completion.info.clone().map(|info| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::Markdown,
                value: info,
            })
        }),
        insert_text_format: Some(format),
        text_edit: Some(CompletionTextEdit::Edit(TextEdit { range, new_text })),
        ..Default::default()
    }
}

/// Character offsets of each parameter inside a `name(a,b)` label.
fn parameter_offsets(label: &str) -> Vec<[u32; 2]> {
    let Some(open) = label.find('(') else {
        return Vec::new();
    };
    let inner = label[open + 1..].trim_end_matches(')');
    if inner.is_empty() {
        return Vec::new();
    }

    let mut offsets = Vec::new();
    let mut start = label[..=open].chars().count();
    for name in inner.split(',') {
        let end = start + name.chars().count();
        offsets.push([start as u32, end as u32]);
        start = end + 1;
    }
    offsets
}

fn signature_help(hint: &ArgumentHint) -> SignatureHelp {
    let parameters = parameter_offsets(&hint.signature)
        .into_iter()
        .map(|offsets| ParameterInformation {
            label: ParameterLabel::LabelOffsets(offsets),
            documentation: None,
        })
        .collect();
    let active_parameter = Some(hint.parameter as u32);
    SignatureHelp {
        signatures: vec![SignatureInformation {
            label: hint.signature.clone(),
            documentation: None,
            parameters: Some(parameters),
            active_parameter,
        }],
        active_signature: Some(0),
        active_parameter,
    }
}

#[async_trait]
impl LanguageServer for ElLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> jsonrpc::Result<InitializeResult> {
        let loaded = InitializationOptions::from_value(params.initialization_options)
            .and_then(|options| {
                let debounce = options.debounce();
                options.into_schema().map(|schema| (schema, debounce))
            });

        {
            let mut state = self.state.lock().await;
            match loaded {
                Ok((schema, debounce)) => {
                    tracing::info!(
                        identifiers = schema.identifiers.len(),
                        functions = schema.functions.len(),
                        types = schema.types.len(),
                        debounce_ms = debounce.as_millis() as u64,
                        "schema loaded"
                    );
                    state.schema = Arc::new(schema);
                    state.debounce = debounce;
                }
                Err(err) => {
                    tracing::error!(error = %format!("{err:#}"), "falling back to empty schema");
                    state.startup_error = Some(format!("{err:#}"));
                }
            }
        }

        let capabilities = ServerCapabilities {
            text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
            hover_provider: Some(HoverProviderCapability::Simple(true)),
            completion_provider: Some(CompletionOptions {
                resolve_provider: Some(false),
                trigger_characters: Some(vec![".".into()]),
                all_commit_characters: None,
                work_done_progress_options: WorkDoneProgressOptions {
                    work_done_progress: None,
                },
                completion_item: None,
            }),
            signature_help_provider: Some(SignatureHelpOptions {
                trigger_characters: Some(vec!["(".into(), ",".into()]),
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(InitializeResult {
            server_info: Some(ServerInfo {
                name: "el-lsp".into(),
                version: Some(env!("CARGO_PKG_VERSION").into()),
            }),
            capabilities,
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let startup_error = self.state.lock().await.startup_error.take();
        if let Some(message) = startup_error {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("schema unavailable, analyzing without one: {message}"),
                )
                .await;
        }
        self.client
            .log_message(MessageType::INFO, "expression language server initialized")
            .await;
    }

    async fn shutdown(&self) -> jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_change_configuration(
        &self,
        params: tower_lsp::lsp_types::DidChangeConfigurationParams,
    ) {
        let options = match InitializationOptions::from_value(Some(params.settings)) {
            Ok(options) if options.schema.is_some() || options.schema_path.is_some() => options,
            Ok(_) => return,
            Err(err) => {
                self.client
                    .log_message(MessageType::ERROR, format!("{err:#}"))
                    .await;
                return;
            }
        };
        let debounce = options.debounce();
        match options.into_schema() {
            Ok(schema) => {
                {
                    let mut state = self.state.lock().await;
                    state.schema = Arc::new(schema);
                    state.debounce = debounce;
                }
                self.client
                    .log_message(MessageType::INFO, "schema reloaded")
                    .await;
                self.relint_all().await;
            }
            Err(err) => {
                self.client
                    .log_message(MessageType::ERROR, format!("{err:#}"))
                    .await;
            }
        }
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let uri = params.text_document.uri;
        self.upsert_document(&uri, params.text_document.text, params.text_document.version)
            .await;
        if let Err(err) = self.lint_and_publish(&uri, None).await {
            self.client
                .log_message(MessageType::ERROR, format!("failed to open {uri}: {err}"))
                .await;
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let DidChangeTextDocumentParams {
            text_document,
            content_changes,
        } = params;
        let uri = text_document.uri;
        let version = text_document.version;

        let mut error_message = None;
        {
            let mut state = self.state.lock().await;
            if let Some(doc) = state.documents.get_mut(&uri) {
                for change in content_changes {
                    if let Err(err) =
                        apply_content_change(&mut doc.text, change.range, &change.text)
                    {
                        error_message = Some(format!("failed to apply change for {uri}: {err}"));
                        break;
                    }
                }
                if error_message.is_none() {
                    doc.version = version;
                }
            } else {
                error_message = Some(format!("received change for unknown document {uri}"));
            }
        }

        if let Some(message) = error_message {
            self.client.log_message(MessageType::ERROR, message).await;
            return;
        }

        self.schedule_lint(uri, version).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.remove_document(&uri).await;
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }

    async fn completion(&self, params: CompletionParams) -> jsonrpc::Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let explicit = params
            .context
            .as_ref()
            .is_some_and(|context| context.trigger_kind == CompletionTriggerKind::INVOKED);

        let Some((text, schema)) = self.document_snapshot(&uri).await else {
            return Ok(None);
        };
        let index = LineIndex::new(&text);
        let Some(offset) = index.offset(&text, &position) else {
            return Ok(None);
        };

        let tree = parse(&text);
        let request = CompletionRequest {
            position: offset,
            explicit,
        };
        let Some(result) = complete(&tree, &schema, request) else {
            return Ok(None);
        };

        let range = index.range(&text, result.from, result.to);
        let items = result
            .options
            .iter()
            .map(|option| completion_item(option, range))
            .collect();
        Ok(Some(CompletionResponse::List(CompletionList {
            is_incomplete: false,
            items,
        })))
    }

    async fn hover(&self, params: HoverParams) -> jsonrpc::Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((text, schema)) = self.document_snapshot(&uri).await else {
            return Ok(None);
        };
        let index = LineIndex::new(&text);
        let Some(offset) = index.offset(&text, &position) else {
            return Ok(None);
        };

        let tree = parse(&text);
        let Some(info) = hover(&tree, &schema, offset, Bias::Any) else {
            return Ok(None);
        };
        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value: info.content,
            }),
            range: Some(index.range(&text, info.from, info.to)),
        }))
    }

    async fn signature_help(&self, params: SignatureHelpParams) -> jsonrpc::Result<Option<SignatureHelp>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some((text, schema)) = self.document_snapshot(&uri).await else {
            return Ok(None);
        };
        let index = LineIndex::new(&text);
        let Some(offset) = index.offset(&text, &position) else {
            return Ok(None);
        };

        let tree = parse(&text);
        let hints = argument_hints(&tree, &schema, &[Selection::caret(offset)]);
        Ok(hints.first().map(signature_help))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the protocol.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env("EL_LOG")
                .unwrap_or_else(|_| "el_lsp=info,el_analyzer=warn".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(ElLanguageServer::new);
    let server = Server::new(stdin, stdout, socket);
    let local = task::LocalSet::new();
    local
        .run_until(async move {
            server.serve(service).await;
        })
        .await;

    Ok(())
}

//! File transfer RPCs: chunked upload, streamed download, streamed listing
//!
//! Every call first takes an admission ticket for its operation class. For
//! the streaming responses the ticket moves into the producer task, so the
//! slot stays occupied until the last message is sent.

use crate::admission::{AdmissionControl, AdmissionTicket, OperationClass};
use crate::config::{TransferSettings, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_FILE_SIZE};
use crate::error::FileServiceError;
use crate::grpc::deadline::CallDeadline;
use crate::grpc::proto;
use crate::grpc::proto::file_service_server::FileService;
use crate::grpc::proto::upload_file_request::Data;
use crate::grpc::proto::{
    DownloadFileRequest, DownloadFileResponse, ListFilesRequest, ListFilesResponse,
    UploadFileRequest, UploadFileResponse,
};
use crate::store::files::sanitize_title;
use crate::store::{ContentReader, FileDraft, FileRecord, FileStore, Owner};
use grpc_jwt_propagation::{JwtClaims, JwtClaimsExt};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::{Code, Request, Response, Status, Streaming};
use tracing::{debug, error, info, warn};

/// Download header carrying the file id
pub const ID_HEADER: &str = "id";
/// Download header carrying the percent-encoded title
pub const TITLE_HEADER: &str = "title";
/// Download header carrying the size in bytes
pub const SIZE_HEADER: &str = "size";

const RESPONSE_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_file_size: u64,
    pub chunk_size: usize,
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl From<&TransferSettings> for TransferLimits {
    fn from(settings: &TransferSettings) -> Self {
        Self {
            max_file_size: settings.max_file_size,
            chunk_size: settings.chunk_size.max(1),
        }
    }
}

#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn FileStore>,
    admission: AdmissionControl,
    limits: TransferLimits,
}

impl TransferService {
    pub fn new(store: Arc<dyn FileStore>, admission: AdmissionControl, limits: TransferLimits) -> Self {
        Self {
            store,
            admission,
            limits,
        }
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    pub fn limits(&self) -> TransferLimits {
        self.limits
    }
}

/// Work out whose files a call is about
///
/// Authenticated callers act for themselves: an empty name means the caller,
/// and any other name is refused. Without claims (public deployment) the name
/// must be given.
pub fn resolve_owner(
    caller: Option<&JwtClaims>,
    requested: &str,
) -> Result<String, FileServiceError> {
    match caller {
        Some(claims) if requested.is_empty() => Ok(claims.subject.clone()),
        Some(claims) if claims.is_owner(requested) => Ok(requested.to_string()),
        Some(claims) => {
            warn!(subject = %claims.subject, owner = requested, "Caller acting for another owner");
            Err(FileServiceError::PermissionDenied(
                "cannot access files of another owner".to_string(),
            ))
        }
        None if requested.is_empty() => Err(FileServiceError::InvalidArgument(
            "owner name is required".to_string(),
        )),
        None => Ok(requested.to_string()),
    }
}

/// Deadline first, then client disconnect
fn check_call<T>(deadline: &CallDeadline, tx: &mpsc::Sender<T>) -> Result<(), FileServiceError> {
    deadline.check()?;
    if tx.is_closed() {
        return Err(FileServiceError::Cancelled);
    }
    Ok(())
}

async fn next_upload_message(
    stream: &mut Streaming<UploadFileRequest>,
) -> Result<Option<UploadFileRequest>, FileServiceError> {
    stream.message().await.map_err(|status| {
        warn!(code = ?status.code(), error = %status.message(), "Upload stream interrupted");
        receive_error(&status)
    })
}

/// Only cancellation and expired deadlines keep their code; any other
/// receive failure is internal
fn receive_error(status: &Status) -> FileServiceError {
    match status.code() {
        Code::Cancelled => FileServiceError::Cancelled,
        Code::DeadlineExceeded => FileServiceError::DeadlineExceeded,
        _ => FileServiceError::Internal(format!("upload stream failed: {}", status.message())),
    }
}

fn file_headers(record: &FileRecord) -> Result<MetadataMap, FileServiceError> {
    let encode = |value: String| {
        AsciiMetadataValue::try_from(value)
            .map_err(|e| FileServiceError::Internal(format!("invalid header value: {}", e)))
    };

    let mut headers = MetadataMap::new();
    headers.insert(ID_HEADER, encode(record.id.to_string())?);
    headers.insert(TITLE_HEADER, encode(urlencoding::encode(&record.title).into_owned())?);
    headers.insert(SIZE_HEADER, encode(record.size_bytes.to_string())?);
    Ok(headers)
}

async fn stream_content(
    mut reader: ContentReader,
    tx: mpsc::Sender<Result<DownloadFileResponse, Status>>,
    deadline: CallDeadline,
    chunk_size: usize,
    file_id: String,
    _ticket: AdmissionTicket,
) {
    let mut buf = vec![0u8; chunk_size];
    let mut sent: u64 = 0;

    loop {
        if let Err(e) = check_call(&deadline, &tx) {
            warn!(file_id = %file_id, bytes = sent, error = %e, "Download stopped");
            let _ = tx.send(Err(e.into())).await;
            return;
        }

        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                error!(file_id = %file_id, error = %e, "Cannot read file content");
                let _ = tx
                    .send(Err(Status::internal("failed to read file content")))
                    .await;
                return;
            }
        };

        let message = DownloadFileResponse {
            chunk: buf[..n].to_vec(),
        };
        // A failed send means the receiver is gone; there is no one left to tell
        if tx.send(Ok(message)).await.is_err() {
            warn!(file_id = %file_id, bytes = sent, "Client went away during download");
            return;
        }
        sent += n as u64;
    }

    info!(file_id = %file_id, bytes = sent, "Download complete");
}

#[tonic::async_trait]
impl FileService for TransferService {
    async fn upload(
        &self,
        request: Request<Streaming<UploadFileRequest>>,
    ) -> Result<Response<UploadFileResponse>, Status> {
        let _ticket = self.admission.admit(OperationClass::Upload).await?;

        let deadline = CallDeadline::from_metadata(request.metadata());
        let caller = request.caller().cloned();
        let mut stream = request.into_inner();

        deadline.check()?;
        let first = next_upload_message(&mut stream).await?.ok_or_else(|| {
            FileServiceError::InvalidArgument("upload ended before file metadata".to_string())
        })?;

        let info = match first.data {
            Some(Data::Info(info)) => info,
            _ => {
                return Err(FileServiceError::InvalidArgument(
                    "first upload message must carry file metadata".to_string(),
                )
                .into())
            }
        };

        let requested_owner = info.owner.unwrap_or_default();
        let owner = Owner {
            name: resolve_owner(caller.as_ref(), &requested_owner.name)?,
            id: requested_owner.id,
        };
        let title = sanitize_title(&info.title)?;

        info!(title = %title, owner = %owner.name, "Receiving upload");

        let mut buffer = Vec::new();
        let mut total: u64 = 0;

        loop {
            deadline.check()?;

            let Some(message) = next_upload_message(&mut stream).await? else {
                break;
            };

            match message.data {
                Some(Data::Chunk(chunk)) => {
                    total += chunk.len() as u64;
                    if total > self.limits.max_file_size {
                        warn!(title = %title, bytes = total, "Upload exceeds size limit");
                        return Err(FileServiceError::FileTooLarge {
                            size: total,
                            limit: self.limits.max_file_size,
                        }
                        .into());
                    }
                    debug!(bytes = chunk.len(), "Received chunk");
                    buffer.extend_from_slice(&chunk);
                }
                Some(Data::Info(_)) => {
                    return Err(FileServiceError::InvalidArgument(
                        "file metadata may only be sent once".to_string(),
                    )
                    .into())
                }
                None => {}
            }
        }

        let record = self.store.save(FileDraft { title, owner }, buffer).await?;

        Ok(Response::new(UploadFileResponse {
            file: Some(proto::File::from(&record)),
            size: total,
        }))
    }

    type DownloadStream = ReceiverStream<Result<DownloadFileResponse, Status>>;

    async fn download(
        &self,
        request: Request<DownloadFileRequest>,
    ) -> Result<Response<Self::DownloadStream>, Status> {
        let ticket = self.admission.admit(OperationClass::Download).await?;

        let deadline = CallDeadline::from_metadata(request.metadata());
        let file_id = request.get_ref().file_id.clone();

        if file_id.is_empty() {
            return Err(FileServiceError::InvalidArgument("file id is required".to_string()).into());
        }

        let record = self
            .store
            .find(&file_id)
            .await?
            .ok_or_else(|| FileServiceError::FileNotFound(file_id.clone()))?;

        // Public deployments (no claims) may download any file
        if request.caller().is_some() {
            request.require_owner(&record.owner.name).map_err(|status| {
                warn!(file_id = %file_id, owner = %record.owner.name, "Download of another owner's file");
                status
            })?;
        }

        let headers = file_headers(&record)?;
        let reader = self.store.open(&record).await?;

        info!(file_id = %file_id, bytes = record.size_bytes, "Starting download");

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        tokio::spawn(stream_content(
            reader,
            tx,
            deadline,
            self.limits.chunk_size,
            file_id,
            ticket,
        ));

        let mut response = Response::new(ReceiverStream::new(rx));
        *response.metadata_mut() = headers;
        Ok(response)
    }

    type ListStream = ReceiverStream<Result<ListFilesResponse, Status>>;

    async fn list(
        &self,
        request: Request<ListFilesRequest>,
    ) -> Result<Response<Self::ListStream>, Status> {
        let ticket = self.admission.admit(OperationClass::List).await?;

        let deadline = CallDeadline::from_metadata(request.metadata());
        let owner_name = resolve_owner(request.caller(), &request.get_ref().owner_name)?;

        let records = self.store.list_by_owner(&owner_name).await?;
        info!(owner = %owner_name, count = records.len(), "Listing files");

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        tokio::spawn(async move {
            let _ticket = ticket;

            for record in &records {
                if let Err(e) = check_call(&deadline, &tx) {
                    warn!(owner = %owner_name, error = %e, "Listing stopped");
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }

                let message = ListFilesResponse {
                    file: Some(proto::File::from(record)),
                };
                // Receiver gone, so no status can be delivered
                if tx.send(Ok(message)).await.is_err() {
                    warn!(owner = %owner_name, "Client went away during listing");
                    return;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}

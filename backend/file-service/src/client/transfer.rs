//! File transfer client
//!
//! Calls are bounded by the same per-class ceilings the server enforces, so
//! one client never queues more work than the server would admit at once.

use crate::admission::{AdmissionControl, AdmissionTicket, OperationClass};
use crate::client::ClientError;
use crate::config::DEFAULT_CHUNK_SIZE;
use crate::grpc::proto;
use crate::grpc::proto::file_service_client::FileServiceClient;
use crate::grpc::proto::upload_file_request::Data;
use crate::grpc::proto::{DownloadFileRequest, ListFilesRequest, UploadFileRequest};
use crate::grpc::transfer::{ID_HEADER, SIZE_HEADER, TITLE_HEADER};
use crate::store::files::sanitize_title;
use chrono::{DateTime, Utc};
use grpc_jwt_propagation::JwtClientInterceptor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codegen::InterceptedService;
use tonic::metadata::MetadataMap;
use tonic::transport::Channel;
use tonic::Request;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Capacity of the in-memory pipe between the receiver task and the file
const DOWNLOAD_PIPE_CAPACITY: usize = 64 * 1024;
const UPLOAD_QUEUE: usize = 8;

type AuthenticatedChannel = InterceptedService<Channel, JwtClientInterceptor>;

/// A file as reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFile {
    pub id: String,
    pub title: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_name: String,
}

impl TryFrom<proto::File> for RemoteFile {
    type Error = ClientError;

    fn try_from(file: proto::File) -> Result<Self, Self::Error> {
        let timestamp = |secs: i64| {
            DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| ClientError::InvalidResponse(format!("bad timestamp {}", secs)))
        };

        Ok(Self {
            created_at: timestamp(file.created_at)?,
            updated_at: timestamp(file.updated_at)?,
            owner_name: file.owner.map(|owner| owner.name).unwrap_or_default(),
            id: file.id,
            title: file.title,
            size_bytes: file.size_bytes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file: RemoteFile,
    /// Bytes the server measured
    pub size: u64,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub id: String,
    pub path: PathBuf,
    pub title: String,
    /// Size announced in the response headers
    pub size: u64,
    /// Bytes actually written to `path`
    pub bytes_written: u64,
}

#[derive(Debug, Clone)]
pub struct TransferClient {
    service: FileServiceClient<AuthenticatedChannel>,
    admission: AdmissionControl,
    chunk_size: usize,
    request_timeout: Option<Duration>,
    download_dir: PathBuf,
}

impl TransferClient {
    pub fn new(
        channel: Channel,
        interceptor: JwtClientInterceptor,
        download_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            service: FileServiceClient::with_interceptor(channel, interceptor),
            admission: AdmissionControl::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_timeout: None,
            download_dir: download_dir.into(),
        }
    }

    pub fn with_admission(mut self, admission: AdmissionControl) -> Self {
        self.admission = admission;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Deadline sent with every call as `grpc-timeout`
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn admission(&self) -> &AdmissionControl {
        &self.admission
    }

    async fn admit(&self, class: OperationClass) -> Result<AdmissionTicket, ClientError> {
        self.admission
            .admit(class)
            .await
            .map_err(|e| ClientError::Admission(e.to_string()))
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(timeout) = self.request_timeout {
            request.set_timeout(timeout);
        }
        request
    }

    /// Upload the file at `path`, titled with its file name
    pub async fn upload_file(&self, owner: &str, path: &Path) -> Result<UploadedFile, ClientError> {
        let title = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| ClientError::InvalidPath(path.display().to_string()))?;

        let file = tokio::fs::File::open(path).await?;
        self.upload_reader(owner, &title, file).await
    }

    /// Upload everything `reader` yields as one file
    ///
    /// A read failure is returned once the server has rejected the partial
    /// upload, so a truncated file is never stored.
    pub async fn upload_reader<R>(
        &self,
        owner: &str,
        title: &str,
        reader: R,
    ) -> Result<UploadedFile, ClientError>
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        let _ticket = self.admit(OperationClass::Upload).await?;

        let (tx, rx) = mpsc::channel(UPLOAD_QUEUE);
        let info = UploadFileRequest {
            data: Some(Data::Info(proto::File {
                title: title.to_string(),
                owner: Some(proto::Owner {
                    id: String::new(),
                    name: owner.to_string(),
                }),
                ..Default::default()
            })),
        };
        // The queue is empty, so this cannot block
        tx.send(info.clone())
            .await
            .map_err(|_| ClientError::InvalidResponse("upload queue closed".to_string()))?;

        // `tx` stays here so the request stream only ends once every chunk
        // was produced
        let producer_tx = tx.clone();
        let chunk_size = self.chunk_size;
        let mut producer =
            tokio::spawn(async move { send_chunks(reader, &producer_tx, chunk_size).await });

        let mut service = self.service.clone();
        let call = service.upload(self.request(ReceiverStream::new(rx)));
        tokio::pin!(call);

        let response = tokio::select! {
            response = &mut call => {
                producer.abort();
                if response.is_err() {
                    reject_partial_upload(&tx, info).await;
                }
                drop(tx);
                response?
            }
            produced = &mut producer => {
                let error = match produced {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(join) => Some(std::io::Error::other(join)),
                };

                match error {
                    None => {
                        drop(tx);
                        call.await?
                    }
                    Some(e) => {
                        warn!(title, error = %e, "Cannot read upload source, abandoning upload");
                        reject_partial_upload(&tx, info).await;
                        drop(tx);
                        if let Err(status) = call.await {
                            debug!(code = ?status.code(), "Abandoned upload rejected");
                        }
                        return Err(e.into());
                    }
                }
            }
        };

        let response = response.into_inner();
        let file = response
            .file
            .ok_or_else(|| ClientError::InvalidResponse("upload response without file".to_string()))?;
        let file = RemoteFile::try_from(file)?;

        info!(file_id = %file.id, bytes = response.size, "File uploaded");
        Ok(UploadedFile {
            file,
            size: response.size,
        })
    }

    pub async fn list_files(&self, owner: &str) -> Result<Vec<RemoteFile>, ClientError> {
        let _ticket = self.admit(OperationClass::List).await?;

        let mut service = self.service.clone();
        let mut stream = service
            .list(self.request(ListFilesRequest {
                owner_name: owner.to_string(),
            }))
            .await?
            .into_inner();

        let mut files = Vec::new();
        while let Some(message) = stream.message().await? {
            if let Some(file) = message.file {
                files.push(RemoteFile::try_from(file)?);
            }
        }
        Ok(files)
    }

    /// Download a file into `<download_dir>/<uuid>-<title>`
    ///
    /// A receive failure, or fewer or more bytes than the `size` header
    /// announced, removes the partial file and is returned.
    pub async fn download(&self, file_id: &str) -> Result<DownloadedFile, ClientError> {
        let _ticket = self.admit(OperationClass::Download).await?;

        let mut service = self.service.clone();
        let response = service
            .download(self.request(DownloadFileRequest {
                file_id: file_id.to_string(),
            }))
            .await?;
        let (metadata, mut stream, _) = response.into_parts();

        let id = header(&metadata, ID_HEADER)?;
        let raw_title = header(&metadata, TITLE_HEADER)?;
        let title = urlencoding::decode(&raw_title)
            .map_err(|e| ClientError::InvalidResponse(format!("bad title header: {}", e)))?;
        let title = sanitize_title(&title)
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        let size: u64 = header(&metadata, SIZE_HEADER)?
            .parse()
            .map_err(|_| ClientError::InvalidResponse("bad size header".to_string()))?;

        let (mut writer, mut pipe) = tokio::io::duplex(DOWNLOAD_PIPE_CAPACITY);
        let receiver = tokio::spawn(async move {
            while let Some(message) = stream.message().await? {
                if !message.chunk.is_empty() {
                    writer.write_all(&message.chunk).await?;
                }
            }
            writer.shutdown().await?;
            Ok::<(), ClientError>(())
        });

        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self
            .download_dir
            .join(format!("{}-{}", Uuid::new_v4(), title));
        let mut file = tokio::fs::File::create(&path).await?;

        let copied = tokio::io::copy(&mut pipe, &mut file).await;
        drop(pipe);
        let received = receiver.await;

        let outcome = match (copied, received) {
            (Err(e), _) => Err(ClientError::Io(e)),
            (Ok(_), Ok(Err(e))) => Err(e),
            (Ok(_), Err(join)) => Err(ClientError::Io(std::io::Error::other(join))),
            (Ok(bytes), Ok(Ok(()))) if bytes != size => Err(ClientError::InvalidResponse(
                format!("received {} bytes, expected {}", bytes, size),
            )),
            (Ok(bytes), Ok(Ok(()))) => file.flush().await.map(|_| bytes).map_err(ClientError::Io),
        };

        match outcome {
            Ok(bytes_written) => {
                info!(file_id = %id, path = %path.display(), bytes = bytes_written, "File downloaded");
                Ok(DownloadedFile {
                    id,
                    path,
                    title,
                    size,
                    bytes_written,
                })
            }
            Err(e) => {
                drop(file);
                if let Err(cleanup) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %cleanup, "Cannot remove partial download");
                }
                Err(e)
            }
        }
    }
}

async fn send_chunks<R>(
    mut reader: R,
    tx: &mpsc::Sender<UploadFileRequest>,
    chunk_size: usize,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_size];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let message = UploadFileRequest {
            data: Some(Data::Chunk(buf[..n].to_vec())),
        };
        if tx.send(message).await.is_err() {
            // Call already finished; its outcome is reported by the caller
            return Ok(());
        }
    }
}

/// Make the server drop a partially sent upload
///
/// Closing the request stream would read as a complete upload. A second
/// metadata message is rejected with `InvalidArgument` and nothing is stored.
async fn reject_partial_upload(tx: &mpsc::Sender<UploadFileRequest>, info: UploadFileRequest) {
    if tx.send(info).await.is_err() {
        debug!("Upload stream already closed by the server");
    }
}

fn header(metadata: &MetadataMap, key: &str) -> Result<String, ClientError> {
    metadata
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ClientError::InvalidResponse(format!("missing {} header", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_file_from_proto() {
        let file = RemoteFile::try_from(proto::File {
            id: "abc".to_string(),
            title: "report.pdf".to_string(),
            size_bytes: 5000,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
            owner: Some(proto::Owner {
                id: String::new(),
                name: "admin".to_string(),
            }),
        })
        .unwrap();

        assert_eq!(file.owner_name, "admin");
        assert_eq!(file.created_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_header_lookup() {
        let mut metadata = MetadataMap::new();
        metadata.insert(SIZE_HEADER, "42".parse().unwrap());

        assert_eq!(header(&metadata, SIZE_HEADER).unwrap(), "42");
        assert!(matches!(
            header(&metadata, TITLE_HEADER),
            Err(ClientError::InvalidResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_send_chunks_respects_chunk_size() {
        let (tx, mut rx) = mpsc::channel(16);
        let content: Vec<u8> = (0..10u8).collect();

        send_chunks(std::io::Cursor::new(content.clone()), &tx, 4)
            .await
            .unwrap();
        drop(tx);

        let mut received = Vec::new();
        while let Some(message) = rx.recv().await {
            match message.data {
                Some(Data::Chunk(chunk)) => {
                    assert!(chunk.len() <= 4);
                    received.extend(chunk);
                }
                other => panic!("unexpected message: {:?}", other),
            }
        }
        assert_eq!(received, content);
    }
}

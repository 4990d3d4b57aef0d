use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::{DisplayErrorContext, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use tokio::runtime::Runtime;
use url::Url;

use super::{ObjectStore, key_segments};
use crate::error::SinkError;

/// S3 (or S3-compatible) bucket under an optional key prefix.
///
/// The SDK is async; the store owns a small multi-thread runtime and blocks
/// on it so callers stay synchronous.
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    runtime: Runtime,
}

impl S3Store {
    /// Build from `s3://bucket/prefix`, loading credentials and region from
    /// the environment. `AWS_S3_ENDPOINT` points the client at a custom
    /// endpoint (MinIO and the like) using path-style addressing.
    pub fn from_url(url: &Url) -> Result<Self, SinkError> {
        let (bucket, prefix) = parse_location(url)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("chunkline-s3")
            .enable_all()
            .build()?;
        let client = runtime.block_on(client_from_env());

        Ok(Self {
            client,
            bucket,
            prefix,
            runtime,
        })
    }

    fn resolve(&self, key: &str) -> Result<String, SinkError> {
        object_key(&self.prefix, key)
    }
}

/// `(bucket, prefix)` of an `s3://` URL, prefix without surrounding slashes
fn parse_location(url: &Url) -> Result<(String, String), SinkError> {
    if url.cannot_be_a_base() {
        return Err(SinkError::Config(format!("invalid s3 url - {url}")));
    }
    let bucket = url
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| SinkError::Config(format!("bucket is missing in {url}")))?;
    Ok((bucket.to_string(), url.path().trim_matches('/').to_string()))
}

fn object_key(prefix: &str, key: &str) -> Result<String, SinkError> {
    key_segments(key)?;
    if prefix.is_empty() {
        Ok(key.to_string())
    } else {
        Ok(format!("{prefix}/{key}"))
    }
}

async fn client_from_env() -> aws_sdk_s3::Client {
    let mut loader = aws_config::from_env();
    let endpoint = std::env::var("AWS_S3_ENDPOINT").ok();
    if let Some(endpoint) = &endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&config)
        .force_path_style(endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

fn store_error<E>(key: &str, err: SdkError<E, HttpResponse>) -> SinkError
where
    E: std::error::Error + Send + Sync + 'static,
{
    SinkError::Store {
        key: key.to_string(),
        status: err.raw_response().map(|r| r.status().as_u16()),
        message: DisplayErrorContext(&err).to_string(),
    }
}

impl ObjectStore for S3Store {
    fn put(&self, key: &str, body: Vec<u8>) -> Result<(), SinkError> {
        let key = self.resolve(key)?;
        self.runtime
            .block_on(
                self.client
                    .put_object()
                    .bucket(&self.bucket)
                    .key(&key)
                    .body(ByteStream::from(body))
                    .send(),
            )
            .map_err(|e| store_error(&key, e))?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SinkError> {
        let key = self.resolve(key)?;
        self.runtime.block_on(async {
            let resp = self
                .client
                .get_object()
                .bucket(&self.bucket)
                .key(&key)
                .send()
                .await;
            match resp {
                Ok(out) => {
                    let data = out.body.collect().await.map_err(|e| SinkError::Store {
                        key: key.clone(),
                        status: None,
                        message: e.to_string(),
                    })?;
                    Ok(Some(data.into_bytes().to_vec()))
                }
                Err(SdkError::ServiceError(e)) if e.err().is_no_such_key() => Ok(None),
                Err(e) => Err(store_error(&key, e)),
            }
        })
    }

    fn describe(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}

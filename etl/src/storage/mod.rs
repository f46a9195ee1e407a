pub mod s3;

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_credential_types::provider::{ProvideCredentials, SharedCredentialsProvider};
use aws_sdk_s3::Client as S3Client;
use common::Result;
use datafusion::execution::context::SessionContext;
use object_store::CredentialProvider;
use object_store::aws::{AmazonS3Builder, AwsCredential};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use url::Url;

const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Serves object store requests from the SDK credential chain, so both
/// clients sign with the same identity.
#[derive(Debug)]
struct SdkCredentialProvider {
    provider: SharedCredentialsProvider,
    cached: Mutex<Option<(Arc<AwsCredential>, Option<SystemTime>)>>,
}

impl SdkCredentialProvider {
    fn new(provider: SharedCredentialsProvider) -> Self {
        Self {
            provider,
            cached: Mutex::new(None),
        }
    }
}

fn is_fresh(expiry: Option<SystemTime>) -> bool {
    match expiry {
        Some(expiry) => SystemTime::now() + REFRESH_MARGIN < expiry,
        None => true,
    }
}

#[async_trait]
impl CredentialProvider for SdkCredentialProvider {
    type Credential = AwsCredential;

    async fn get_credential(&self) -> object_store::Result<Arc<AwsCredential>> {
        let mut cached = self.cached.lock().await;
        if let Some((credential, expiry)) = cached.as_ref() {
            if is_fresh(*expiry) {
                return Ok(credential.clone());
            }
        }

        let credentials = self
            .provider
            .provide_credentials()
            .await
            .map_err(|e| object_store::Error::Generic {
                store: "S3",
                source: Box::new(e),
            })?;
        let credential = Arc::new(AwsCredential {
            key_id: credentials.access_key_id().to_string(),
            secret_key: credentials.secret_access_key().to_string(),
            token: credentials.session_token().map(str::to_string),
        });
        *cached = Some((credential.clone(), credentials.expiry()));
        Ok(credential)
    }
}

/// Builds S3 clients and object stores from the ambient AWS configuration.
#[derive(Clone)]
pub struct S3Manager {
    client: Arc<S3Client>,
    credentials: Option<SharedCredentialsProvider>,
    region: Option<String>,
    endpoint: Option<String>,
}

impl S3Manager {
    /// `endpoint` targets an S3-compatible service with path-style addressing.
    pub fn new(sdk_config: &SdkConfig, endpoint: Option<String>) -> Self {
        let mut builder = aws_sdk_s3::config::Builder::from(sdk_config);
        if let Some(endpoint) = &endpoint {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self {
            client: Arc::new(S3Client::from_conf(builder.build())),
            credentials: sdk_config.credentials_provider(),
            region: sdk_config.region().map(|r| r.to_string()),
            endpoint,
        }
    }

    pub fn client(&self) -> Arc<S3Client> {
        self.client.clone()
    }

    pub fn object_store(&self, bucket: &str) -> Result<Arc<object_store::aws::AmazonS3>> {
        let mut builder = AmazonS3Builder::new().with_bucket_name(bucket);
        if let Some(provider) = &self.credentials {
            let credentials = SdkCredentialProvider::new(provider.clone());
            builder = builder.with_credentials(Arc::new(credentials));
        }
        if let Some(region) = &self.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &self.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        Ok(Arc::new(builder.build()?))
    }

    /// Makes `s3://<bucket>` URLs resolvable by the session.
    pub fn register_object_store(&self, ctx: &SessionContext, bucket: &str) -> Result<()> {
        let store = self.object_store(bucket)?;
        let url = Url::parse(&format!("s3://{}", bucket))?;
        ctx.runtime_env().register_object_store(&url, store);
        Ok(())
    }
}

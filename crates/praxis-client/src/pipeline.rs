//! The request pipeline wraps every call to a backend.
//!
//! For authenticated calls it obtains a usable token (refreshing first when
//! the stored one is near expiry), builds headers, and on a 401 refreshes
//! once and reissues the same request once. A call that still cannot be
//! authorized ends the session and fails with `SessionExpired`.
//!
//! The backend is chosen once per call. Its refresh exchange and its retry
//! go to that same backend even if the mode changes mid-call.

use std::future::Future;
use std::sync::Arc;

use praxis_auth::lifecycle::TokenLifecycle;
use praxis_core::request::ApiRequest;
use tracing::{debug, warn};

use crate::auth::BackendRefresher;
use crate::backend::{
    ApiResponse, AUTHORIZATION, Backend, BackendSelector, CONTENT_TYPE, JSON, OutboundRequest,
    ROLE_OVERRIDE, StreamResponse,
};
use crate::error::ClientError;
use crate::mode::BackendMode;

const UNAUTHORIZED: u16 = 401;

/// Responses the retry protocol can inspect.
trait Status {
    fn status(&self) -> u16;
}

impl Status for ApiResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

impl Status for StreamResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

pub struct RequestPipeline {
    backends: BackendSelector,
    lifecycle: Arc<TokenLifecycle>,
    role_override: Option<String>,
}

impl RequestPipeline {
    pub fn new(backends: BackendSelector, lifecycle: Arc<TokenLifecycle>) -> Self {
        Self {
            backends,
            lifecycle,
            role_override: None,
        }
    }

    /// Send `X-Role-Override` on networked calls.
    pub fn with_role_override(mut self, role: Option<String>) -> Self {
        self.role_override = role.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn lifecycle(&self) -> &Arc<TokenLifecycle> {
        &self.lifecycle
    }

    pub fn backends(&self) -> &BackendSelector {
        &self.backends
    }

    /// Perform one logical call.
    ///
    /// Statuses other than 401 come back as `Ok` for the operation to
    /// interpret. A success that must carry a body but arrived empty is a
    /// decode error.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let (outbound, response) = self
            .dispatch(request, |backend, outbound| async move {
                let response = backend.execute(&outbound).await?;
                Ok((outbound, response))
            })
            .await?;
        check_body(&outbound.request, response)
    }

    /// Open a streaming call under the same token protocol. A non-success
    /// status is drained and returned as an error.
    pub async fn open_stream(&self, request: ApiRequest) -> Result<StreamResponse, ClientError> {
        let (_, response) = self
            .dispatch(request, |backend, outbound| async move {
                let response = backend.open_stream(&outbound).await?;
                Ok((outbound, response))
            })
            .await?;

        if response.is_success() {
            Ok(response)
        } else {
            Err(response.collect().await?.into_error())
        }
    }

    async fn dispatch<R, F, Fut>(
        &self,
        request: ApiRequest,
        call: F,
    ) -> Result<(OutboundRequest, R), ClientError>
    where
        R: Status,
        F: Fn(Arc<dyn Backend>, OutboundRequest) -> Fut,
        Fut: Future<Output = Result<(OutboundRequest, R), ClientError>>,
    {
        let backend = self.backends.current();
        let mode = backend.mode();

        if !request.requires_auth {
            let outbound = self.prepare(request, None, mode);
            return call(backend, outbound).await;
        }

        let refresher = BackendRefresher::new(Arc::clone(&backend));
        let token = self.authorize(&refresher).await?;
        let outbound = self.prepare(request, Some(&token), mode);
        let (outbound, response) = call(Arc::clone(&backend), outbound).await?;
        if response.status() != UNAUTHORIZED {
            return Ok((outbound, response));
        }

        debug!(
            method = %outbound.request.method,
            path = %outbound.request.path,
            "received 401, refreshing once before retry"
        );
        let token = self.reauthorize(&refresher).await?;
        let outbound = self.prepare(outbound.request, Some(&token), mode);
        let (outbound, retry) = call(backend, outbound).await?;

        if retry.status() == UNAUTHORIZED {
            warn!(
                method = %outbound.request.method,
                path = %outbound.request.path,
                "retry after refresh was rejected, ending session"
            );
            self.lifecycle.end_session();
            return Err(ClientError::SessionExpired {
                status: Some(UNAUTHORIZED),
            });
        }
        Ok((outbound, retry))
    }

    /// A usable token for the first attempt, refreshing proactively if the
    /// stored one is missing or near expiry.
    async fn authorize(&self, refresher: &BackendRefresher) -> Result<String, ClientError> {
        match self.lifecycle.usable_id_token(refresher).await {
            Some(token) => Ok(token),
            None => {
                self.lifecycle.end_session();
                Err(ClientError::SessionExpired { status: None })
            }
        }
    }

    /// The token for the single retry after a 401.
    async fn reauthorize(&self, refresher: &BackendRefresher) -> Result<String, ClientError> {
        if self.lifecycle.refresh(refresher).await
            && let Some(token) = self.lifecycle.id_token()
        {
            return Ok(token);
        }
        self.lifecycle.end_session();
        Err(ClientError::SessionExpired {
            status: Some(UNAUTHORIZED),
        })
    }

    fn prepare(&self, request: ApiRequest, token: Option<&str>, mode: BackendMode) -> OutboundRequest {
        let mut outbound = OutboundRequest::new(request);
        if let Some(token) = token {
            outbound = outbound.with_header(AUTHORIZATION, format!("Bearer {token}"));
        }
        if outbound.request.has_body() {
            outbound = outbound.with_header(CONTENT_TYPE, JSON);
        }
        if mode == BackendMode::Networked
            && let Some(role) = &self.role_override
        {
            outbound = outbound.with_header(ROLE_OVERRIDE, role.as_str());
        }
        outbound
    }
}

fn check_body(request: &ApiRequest, response: ApiResponse) -> Result<ApiResponse, ClientError> {
    if response.is_success() && request.requires_body && response.body.is_empty() {
        return Err(ClientError::Decode(format!(
            "{} {} returned an empty body",
            request.method, request.path
        )));
    }
    Ok(response)
}

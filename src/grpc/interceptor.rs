//! Tenancy gate and bearer-token capture for gRPC calls.

use std::sync::Arc;

use tonic::service::Interceptor;
use tonic::{Request, Status};

use crate::net::Protocol;
use crate::observability::metrics;
use crate::query::{BearerToken, RequestContext};
use crate::tenancy::{Tenant, TenancyManager};

const AUTHORIZATION: &str = "authorization";

/// Rejects calls without a tenant (when enforced) and stores the tenant and
/// bearer token in the request extensions for the handlers.
#[derive(Debug, Clone)]
pub struct RequestInterceptor {
    tenancy: Arc<TenancyManager>,
    bearer_token_propagation: bool,
}

impl RequestInterceptor {
    pub fn new(tenancy: Arc<TenancyManager>, bearer_token_propagation: bool) -> Self {
        Self {
            tenancy,
            bearer_token_propagation,
        }
    }
}

impl Interceptor for RequestInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let tenant_value = request
            .metadata()
            .get(self.tenancy.header().as_str())
            .and_then(|v| v.to_str().ok());

        let tenant = self.tenancy.check(tenant_value).map_err(|e| {
            metrics::record_tenancy_rejection(Protocol::Grpc);
            Status::unauthenticated(e.to_string())
        })?;

        let bearer = self
            .bearer_token_propagation
            .then(|| {
                request
                    .metadata()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(BearerToken::from_authorization)
            })
            .flatten();

        if let Some(tenant) = tenant {
            request.extensions_mut().insert(tenant);
        }
        if let Some(token) = bearer {
            request.extensions_mut().insert(token);
        }
        Ok(request)
    }
}

/// Rebuild the request context stored by [`RequestInterceptor`].
pub fn request_context<T>(request: &Request<T>) -> RequestContext {
    RequestContext {
        tenant: request.extensions().get::<Tenant>().cloned(),
        bearer_token: request.extensions().get::<BearerToken>().cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyOptions;
    use tonic::Code;

    fn interceptor(tenancy: bool, bearer: bool) -> RequestInterceptor {
        let manager = TenancyManager::new(&TenancyOptions {
            enabled: tenancy,
            header: "x-tenant".into(),
        });
        RequestInterceptor::new(Arc::new(manager), bearer)
    }

    #[test]
    fn missing_tenant_is_unauthenticated() {
        let err = interceptor(true, false).call(Request::new(())).unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }

    #[test]
    fn tenant_and_token_reach_extensions() {
        let mut request = Request::new(());
        request.metadata_mut().insert("x-tenant", "acme".parse().unwrap());
        request.metadata_mut().insert("authorization", "Bearer s3cret".parse().unwrap());

        let request = interceptor(true, true).call(request).unwrap();
        let ctx = request_context(&request);
        assert_eq!(ctx.tenant, Some(Tenant("acme".into())));
        assert_eq!(ctx.bearer_token, Some(BearerToken("s3cret".into())));
    }

    #[test]
    fn token_ignored_without_propagation() {
        let mut request = Request::new(());
        request.metadata_mut().insert("authorization", "Bearer s3cret".parse().unwrap());

        let request = interceptor(false, false).call(request).unwrap();
        assert_eq!(request_context(&request), RequestContext::default());
    }
}

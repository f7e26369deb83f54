//! Closure-based request and response mutation.

use fetchwire_core::{Error, Request, Response};

use crate::connection::StreamInfo;
use crate::interceptor::{
    ApplicationInterceptor, ApplicationNext, BoxFuture, NetworkInterceptor, NetworkNext,
};

/// Mutate the request before it continues down the chain. An `Err` aborts
/// the call.
///
/// ```ignore
/// let client = HttpClient::builder()
///     .intercept(ModifyRequest::new(|req: &mut Request| {
///         req.set_header("x-request-id", new_id())
///     }))
///     .build()?;
/// ```
pub struct ModifyRequest<F> {
    func: F,
}

impl<F> ModifyRequest<F>
where
    F: Fn(&mut Request) -> Result<(), Error> + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ApplicationInterceptor for ModifyRequest<F>
where
    F: Fn(&mut Request) -> Result<(), Error> + Send + Sync + 'static,
{
    fn intercept<'a>(
        &'a self,
        mut request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            (self.func)(&mut request)?;
            next.run(request).await
        })
    }

    fn name(&self) -> &str {
        "ModifyRequest"
    }
}

impl<F> NetworkInterceptor for ModifyRequest<F>
where
    F: Fn(&mut Request) -> Result<(), Error> + Send + Sync + 'static,
{
    fn intercept<'a>(
        &'a self,
        mut request: Request,
        _stream: StreamInfo,
        next: NetworkNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            (self.func)(&mut request)?;
            next.run(request).await
        })
    }

    fn name(&self) -> &str {
        "ModifyRequest"
    }
}

/// Mutate the response on its way back up the chain.
pub struct ModifyResponse<F> {
    func: F,
}

impl<F> ModifyResponse<F>
where
    F: Fn(&mut Response) -> Result<(), Error> + Send + Sync + 'static,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ApplicationInterceptor for ModifyResponse<F>
where
    F: Fn(&mut Response) -> Result<(), Error> + Send + Sync + 'static,
{
    fn intercept<'a>(
        &'a self,
        request: Request,
        next: ApplicationNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let mut response = next.run(request).await?;
            (self.func)(&mut response)?;
            Ok(response)
        })
    }

    fn name(&self) -> &str {
        "ModifyResponse"
    }
}

impl<F> NetworkInterceptor for ModifyResponse<F>
where
    F: Fn(&mut Response) -> Result<(), Error> + Send + Sync + 'static,
{
    fn intercept<'a>(
        &'a self,
        request: Request,
        _stream: StreamInfo,
        next: NetworkNext,
    ) -> BoxFuture<'a, Result<Response, Error>> {
        Box::pin(async move {
            let mut response = next.run(request).await?;
            (self.func)(&mut response)?;
            Ok(response)
        })
    }

    fn name(&self) -> &str {
        "ModifyResponse"
    }
}

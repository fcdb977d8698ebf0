//! Operation execution.
//!
//! [`OperationExecution`] drives one operation through serialization, the
//! retry loop and deserialization, calling interceptor hooks at each stage.

use futures::FutureExt;
use parking_lot::Mutex;
use smithy_rt_retries::{
    AttemptFn, RetryError, RetryPolicy, RetryStrategy, StandardRetryPolicy, StandardRetryStrategy,
};
use smithy_rt_tracing::{SpanGuard, SpanStatus};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::context::{
    ExecutionContext, InputContext, InputMut, OutputContext, OutputMut, RequestContext, RequestMut,
    ResponseContext, ResponseMut,
};
use crate::interceptor::Interceptor;
use crate::shape::{Deserializer, NoSigner, OperationShape, Serializer, Signer, Transport};

/// Runs a read hook on every interceptor. The last error wins and earlier
/// ones are suppressed.
macro_rules! read_all {
    ($self:ident, $execution:expr, $hook:ident, $ctx:expr) => {{
        let view = $ctx;
        let mut latest = None;
        for interceptor in &$self.interceptors {
            if let Err(e) = interceptor.$hook(&view).await {
                if let Some(previous) = latest.replace(e) {
                    $execution.suppress(previous, stringify!($hook));
                }
            }
        }
        match latest {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }};
}

/// Runs a hook on each interceptor, stopping at the first error.
macro_rules! run_each {
    ($self:ident, $hook:ident, $ctx:expr) => {{
        let mut outcome = Ok(());
        for interceptor in &$self.interceptors {
            if let Err(e) = interceptor.$hook($ctx).await {
                outcome = Err(e);
                break;
            }
        }
        outcome
    }};
}

/// Runs a result hook on each interceptor. A hook error replaces the result.
macro_rules! modify_result {
    (
        $self:ident,
        $execution:expr,
        $hook:ident,
        $input:expr,
        $request:expr,
        $response:expr,
        $result:expr
    ) => {{
        for interceptor in &$self.interceptors {
            let ctx = OutputMut {
                execution: $execution,
                input: $input,
                request: $request,
                response: $response,
                result: &mut *$result,
            };
            if let Err(e) = interceptor.$hook(ctx).await {
                replace_result($execution, $result, e, stringify!($hook));
            }
        }
    }};
}

/// Replace `result` with `error`, suppressing an error it already held.
fn replace_result<T, E>(
    execution: &ExecutionContext,
    result: &mut Result<T, E>,
    error: E,
    stage: &'static str,
) where
    E: std::error::Error + Send + Sync + 'static,
{
    if let Err(previous) = std::mem::replace(result, Err(error)) {
        execution.suppress(previous, stage);
    }
}

type Exchange<S> = (<S as OperationShape>::Request, Option<<S as OperationShape>::Response>);

/// Executes one operation.
pub struct OperationExecution<S: OperationShape> {
    serializer: Arc<dyn Serializer<S>>,
    signer: Arc<dyn Signer<S>>,
    transport: Arc<dyn Transport<S>>,
    deserializer: Arc<dyn Deserializer<S>>,
    interceptors: Vec<Arc<dyn Interceptor<S>>>,
    retry_strategy: Arc<dyn RetryStrategy<S::Output, S::Error>>,
    retry_policy: Arc<dyn RetryPolicy<S::Output, S::Error>>,
}

impl<S: OperationShape> OperationExecution<S> {
    /// Create a builder from the required collaborators.
    pub fn builder(
        serializer: Arc<dyn Serializer<S>>,
        transport: Arc<dyn Transport<S>>,
        deserializer: Arc<dyn Deserializer<S>>,
    ) -> OperationExecutionBuilder<S> {
        OperationExecutionBuilder {
            serializer,
            signer: None,
            transport,
            deserializer,
            interceptors: Vec::new(),
            retry_strategy: None,
            retry_policy: None,
        }
    }

    /// Registered interceptors, in call order.
    pub fn interceptors(&self) -> &[Arc<dyn Interceptor<S>>] {
        &self.interceptors
    }

    /// Execute the operation.
    ///
    /// The execution span is closed on return, marked as failed when the
    /// result is an error. Dropping the future stops the execution; open
    /// spans are closed and held retry tokens released.
    pub async fn execute(
        &self,
        input: S::Input,
        ctx: &ExecutionContext,
    ) -> Result<S::Output, S::Error> {
        let guard = SpanGuard::new(ctx.span().clone());
        let mut input = input;

        let last: Mutex<Option<Exchange<S>>> = Mutex::new(None);
        let mut result = match self.prepare(&mut input, ctx).await {
            Ok(request) => {
                let input = &input;
                let request = &request;
                let last = &last;
                let block: AttemptFn<'_, S::Output, S::Error> = Box::new(move |attempt| {
                    self.attempt(attempt, input, request, ctx, last).boxed()
                });
                let outcome = self
                    .retry_strategy
                    .retry(self.retry_policy.as_ref(), ctx.span(), block)
                    .await;
                debug!(
                    operation = ctx.operation_name(),
                    attempts = outcome.attempts(),
                    success = outcome.is_response(),
                    "Retry loop finished"
                );
                outcome.into_result()
            }
            Err(e) => Err(e),
        };

        let exchange = last.into_inner();
        let request = exchange.as_ref().map(|(request, _)| request);
        let response = exchange.as_ref().and_then(|(_, response)| response.as_ref());

        modify_result!(self, ctx, modify_before_completion, &input, request, response, &mut result);

        let read = read_all!(
            self,
            ctx,
            read_after_execution,
            OutputContext {
                execution: ctx,
                input: &input,
                request,
                response,
                result: &result,
            }
        );
        if let Err(e) = read {
            replace_result(ctx, &mut result, e, "read_after_execution");
        }

        if result.is_err() {
            guard.span().set_status(SpanStatus::Error);
        }
        guard.finish();
        result
    }

    /// Execute the operation until `cancel` fires.
    ///
    /// On cancellation the execution is dropped at its current suspension
    /// point and [`RetryError::Cancelled`] is returned through the operation
    /// error type. The retry policy is not consulted.
    pub async fn execute_cancellable(
        &self,
        input: S::Input,
        ctx: &ExecutionContext,
        cancel: CancellationToken,
    ) -> Result<S::Output, S::Error> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(
                    operation = ctx.operation_name(),
                    execution_id = %ctx.execution_id(),
                    attempt = ctx.attempt(),
                    "Execution cancelled"
                );
                Err(RetryError::Cancelled.into())
            }
            result = self.execute(input, ctx) => result,
        }
    }

    /// Everything before the retry loop. An error here skips to completion.
    async fn prepare(
        &self,
        input: &mut S::Input,
        ctx: &ExecutionContext,
    ) -> Result<S::Request, S::Error> {
        read_all!(
            self,
            ctx,
            read_before_execution,
            InputContext {
                execution: ctx,
                input: &*input,
            }
        )?;

        for interceptor in &self.interceptors {
            interceptor
                .modify_before_serialization(InputMut {
                    execution: ctx,
                    input: &mut *input,
                })
                .await?;
        }

        let view = InputContext {
            execution: ctx,
            input: &*input,
        };
        run_each!(self, read_before_serialization, &view)?;

        let mut request = self.serializer.serialize(input, ctx).await?;

        let view = RequestContext {
            execution: ctx,
            input: &*input,
            request: &request,
        };
        run_each!(self, read_after_serialization, &view)?;

        for interceptor in &self.interceptors {
            interceptor
                .modify_before_retry_loop(RequestMut {
                    execution: ctx,
                    input: &*input,
                    request: &mut request,
                })
                .await?;
        }

        Ok(request)
    }

    async fn attempt(
        &self,
        attempt: u32,
        input: &S::Input,
        base: &S::Request,
        ctx: &ExecutionContext,
        last: &Mutex<Option<Exchange<S>>>,
    ) -> Result<S::Output, S::Error> {
        ctx.begin_attempt(attempt);
        let guard = SpanGuard::new(ctx.span().child(format!("attempt-{attempt}")));

        let mut request = base.clone();
        let mut response = None;

        let mut result = match self.transmit(input, &mut request, &mut response, ctx).await {
            Ok(mut result) => {
                let view = OutputContext {
                    execution: ctx,
                    input,
                    request: Some(&request),
                    response: response.as_ref(),
                    result: &result,
                };
                match run_each!(self, read_after_deserialization, &view) {
                    Ok(()) => {
                        modify_result!(
                            self,
                            ctx,
                            modify_before_attempt_completion,
                            input,
                            Some(&request),
                            response.as_ref(),
                            &mut result
                        );
                        result
                    }
                    Err(e) => {
                        replace_result(ctx, &mut result, e, "read_after_deserialization");
                        result
                    }
                }
            }
            Err(e) => Err(e),
        };

        let read = read_all!(
            self,
            ctx,
            read_after_attempt,
            OutputContext {
                execution: ctx,
                input,
                request: Some(&request),
                response: response.as_ref(),
                result: &result,
            }
        );
        if let Err(e) = read {
            replace_result(ctx, &mut result, e, "read_after_attempt");
        }

        if result.is_err() {
            guard.span().set_status(SpanStatus::Error);
        }
        guard.finish();
        *last.lock() = Some((request, response));
        result
    }

    /// Per-attempt stages up to deserialization.
    ///
    /// The outer error is a hook, signing or transport failure and skips to
    /// `read_after_attempt`. The inner result is what deserialization
    /// produced.
    async fn transmit(
        &self,
        input: &S::Input,
        request: &mut S::Request,
        response: &mut Option<S::Response>,
        ctx: &ExecutionContext,
    ) -> Result<Result<S::Output, S::Error>, S::Error> {
        read_all!(
            self,
            ctx,
            read_before_attempt,
            RequestContext {
                execution: ctx,
                input,
                request: &*request,
            }
        )?;

        for interceptor in &self.interceptors {
            interceptor
                .modify_before_signing(RequestMut {
                    execution: ctx,
                    input,
                    request: &mut *request,
                })
                .await?;
        }
        let view = RequestContext {
            execution: ctx,
            input,
            request: &*request,
        };
        run_each!(self, read_before_signing, &view)?;

        self.signer.sign(request, ctx).await?;

        let view = RequestContext {
            execution: ctx,
            input,
            request: &*request,
        };
        run_each!(self, read_after_signing, &view)?;

        for interceptor in &self.interceptors {
            interceptor
                .modify_before_transmit(RequestMut {
                    execution: ctx,
                    input,
                    request: &mut *request,
                })
                .await?;
        }
        let view = RequestContext {
            execution: ctx,
            input,
            request: &*request,
        };
        run_each!(self, read_before_transmit, &view)?;

        let raw = response.insert(self.transport.send(request, ctx).await?);

        let view = ResponseContext {
            execution: ctx,
            input,
            request: &*request,
            response: &*raw,
        };
        run_each!(self, read_after_transmit, &view)?;

        for interceptor in &self.interceptors {
            interceptor
                .modify_before_deserialization(ResponseMut {
                    execution: ctx,
                    input,
                    request: &*request,
                    response: &mut *raw,
                })
                .await?;
        }
        let view = ResponseContext {
            execution: ctx,
            input,
            request: &*request,
            response: &*raw,
        };
        run_each!(self, read_before_deserialization, &view)?;

        Ok(self.deserializer.deserialize(raw, ctx).await)
    }
}

impl<S: OperationShape> fmt::Debug for OperationExecution<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationExecution")
            .field("interceptors", &self.interceptors)
            .field("retry_strategy", &self.retry_strategy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`OperationExecution`].
pub struct OperationExecutionBuilder<S: OperationShape> {
    serializer: Arc<dyn Serializer<S>>,
    signer: Option<Arc<dyn Signer<S>>>,
    transport: Arc<dyn Transport<S>>,
    deserializer: Arc<dyn Deserializer<S>>,
    interceptors: Vec<Arc<dyn Interceptor<S>>>,
    retry_strategy: Option<Arc<dyn RetryStrategy<S::Output, S::Error>>>,
    retry_policy: Option<Arc<dyn RetryPolicy<S::Output, S::Error>>>,
}

impl<S: OperationShape> OperationExecutionBuilder<S> {
    /// Set the signer. Requests are unsigned by default.
    #[must_use]
    pub fn signer(mut self, signer: Arc<dyn Signer<S>>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Append an interceptor.
    #[must_use]
    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor<S>>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Set the retry strategy. Defaults to [`StandardRetryStrategy`].
    #[must_use]
    pub fn retry_strategy(mut self, strategy: Arc<dyn RetryStrategy<S::Output, S::Error>>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    /// Set the retry policy. Defaults to [`StandardRetryPolicy`].
    #[must_use]
    pub fn retry_policy(mut self, policy: Arc<dyn RetryPolicy<S::Output, S::Error>>) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Build the execution.
    pub fn build(self) -> OperationExecution<S> {
        OperationExecution {
            serializer: self.serializer,
            signer: self.signer.unwrap_or_else(|| Arc::new(NoSigner)),
            transport: self.transport,
            deserializer: self.deserializer,
            interceptors: self.interceptors,
            retry_strategy: self
                .retry_strategy
                .unwrap_or_else(|| Arc::new(StandardRetryStrategy::default())),
            retry_policy: self
                .retry_policy
                .unwrap_or_else(|| Arc::new(StandardRetryPolicy::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interceptors::{AttemptMetricsInterceptor, LoggingInterceptor};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use smithy_rt_core::ManualClock;
    use smithy_rt_retries::{ErrorMetadata, NoRetryStrategy, StandardRetryStrategyConfig};
    use smithy_rt_tracing::{MetricValue, RecordingProbe, TraceSpan};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, thiserror::Error)]
    enum EchoError {
        #[error("service unavailable")]
        ServiceUnavailable,
        #[error("interceptor {0} failed")]
        Hook(&'static str),
        #[error(transparent)]
        Runtime(#[from] RetryError),
    }

    impl ErrorMetadata for EchoError {
        fn status_code(&self) -> Option<u16> {
            match self {
                Self::ServiceUnavailable => Some(503),
                _ => None,
            }
        }
    }

    struct Echo;

    impl OperationShape for Echo {
        type Input = String;
        type Output = String;
        type Request = String;
        type Response = String;
        type Error = EchoError;
    }

    struct EchoSerializer;

    #[async_trait]
    impl Serializer<Echo> for EchoSerializer {
        async fn serialize(
            &self,
            input: &String,
            _ctx: &ExecutionContext,
        ) -> Result<String, EchoError> {
            Ok(format!("req:{input}"))
        }
    }

    #[derive(Default)]
    struct FlakyTransport {
        failures: u32,
        hang: bool,
        calls: AtomicU32,
    }

    impl FlakyTransport {
        fn failing(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                ..Self::default()
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport<Echo> for FlakyTransport {
        async fn send(
            &self,
            request: &String,
            _ctx: &ExecutionContext,
        ) -> Result<String, EchoError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                futures::future::pending::<()>().await;
            }
            if call < self.failures {
                return Err(EchoError::ServiceUnavailable);
            }
            Ok(format!("resp:{request}"))
        }
    }

    struct EchoDeserializer;

    #[async_trait]
    impl Deserializer<Echo> for EchoDeserializer {
        async fn deserialize(
            &self,
            response: &String,
            _ctx: &ExecutionContext,
        ) -> Result<String, EchoError> {
            Ok(response.trim_start_matches("resp:").to_string())
        }
    }

    type Log = Arc<Mutex<Vec<String>>>;
    type Hook = Result<(), EchoError>;

    /// Logs every hook and fails the one named in `fail_at`.
    #[derive(Debug, Default)]
    struct Recorder {
        name: &'static str,
        fail_at: Option<&'static str>,
        log: Log,
        completion: Arc<Mutex<Vec<Result<String, EchoError>>>>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: log.clone(),
                ..Self::default()
            }
        }

        fn failing_at(mut self, hook: &'static str) -> Self {
            self.fail_at = Some(hook);
            self
        }

        fn hit(&self, hook: &'static str) -> Hook {
            self.log.lock().push(format!("{}:{hook}", self.name));
            if self.fail_at == Some(hook) {
                return Err(EchoError::Hook(self.name));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Interceptor<Echo> for Recorder {
        async fn read_before_execution(&self, _ctx: &InputContext<'_, Echo>) -> Hook {
            self.hit("read_before_execution")
        }
        async fn modify_before_serialization(&self, _ctx: InputMut<'_, Echo>) -> Hook {
            self.hit("modify_before_serialization")
        }
        async fn read_before_serialization(&self, _ctx: &InputContext<'_, Echo>) -> Hook {
            self.hit("read_before_serialization")
        }
        async fn read_after_serialization(&self, _ctx: &RequestContext<'_, Echo>) -> Hook {
            self.hit("read_after_serialization")
        }
        async fn modify_before_retry_loop(&self, _ctx: RequestMut<'_, Echo>) -> Hook {
            self.hit("modify_before_retry_loop")
        }
        async fn read_before_attempt(&self, _ctx: &RequestContext<'_, Echo>) -> Hook {
            self.hit("read_before_attempt")
        }
        async fn modify_before_signing(&self, _ctx: RequestMut<'_, Echo>) -> Hook {
            self.hit("modify_before_signing")
        }
        async fn read_before_signing(&self, _ctx: &RequestContext<'_, Echo>) -> Hook {
            self.hit("read_before_signing")
        }
        async fn read_after_signing(&self, _ctx: &RequestContext<'_, Echo>) -> Hook {
            self.hit("read_after_signing")
        }
        async fn modify_before_transmit(&self, _ctx: RequestMut<'_, Echo>) -> Hook {
            self.hit("modify_before_transmit")
        }
        async fn read_before_transmit(&self, _ctx: &RequestContext<'_, Echo>) -> Hook {
            self.hit("read_before_transmit")
        }
        async fn read_after_transmit(&self, _ctx: &ResponseContext<'_, Echo>) -> Hook {
            self.hit("read_after_transmit")
        }
        async fn modify_before_deserialization(&self, _ctx: ResponseMut<'_, Echo>) -> Hook {
            self.hit("modify_before_deserialization")
        }
        async fn read_before_deserialization(&self, _ctx: &ResponseContext<'_, Echo>) -> Hook {
            self.hit("read_before_deserialization")
        }
        async fn read_after_deserialization(&self, _ctx: &OutputContext<'_, Echo>) -> Hook {
            self.hit("read_after_deserialization")
        }
        async fn modify_before_attempt_completion(&self, _ctx: OutputMut<'_, Echo>) -> Hook {
            self.hit("modify_before_attempt_completion")
        }
        async fn read_after_attempt(&self, _ctx: &OutputContext<'_, Echo>) -> Hook {
            self.hit("read_after_attempt")
        }
        async fn modify_before_completion(&self, ctx: OutputMut<'_, Echo>) -> Hook {
            self.completion.lock().push(ctx.result.clone());
            self.hit("modify_before_completion")
        }
        async fn read_after_execution(&self, _ctx: &OutputContext<'_, Echo>) -> Hook {
            self.hit("read_after_execution")
        }
    }

    /// Rewrites the input, the request and the final result.
    #[derive(Debug)]
    struct Rewriter;

    #[async_trait]
    impl Interceptor<Echo> for Rewriter {
        async fn modify_before_serialization(&self, ctx: InputMut<'_, Echo>) -> Hook {
            *ctx.input = ctx.input.to_uppercase();
            Ok(())
        }

        async fn modify_before_transmit(&self, ctx: RequestMut<'_, Echo>) -> Hook {
            ctx.request.push('!');
            Ok(())
        }

        async fn modify_before_completion(&self, ctx: OutputMut<'_, Echo>) -> Hook {
            if let Ok(output) = ctx.result {
                output.push_str(" (rewritten)");
            }
            Ok(())
        }
    }

    fn execution(
        transport: Arc<FlakyTransport>,
        interceptors: Vec<Arc<dyn Interceptor<Echo>>>,
        strategy: Arc<dyn RetryStrategy<String, EchoError>>,
    ) -> OperationExecution<Echo> {
        let builder = OperationExecution::<Echo>::builder(
            Arc::new(EchoSerializer),
            transport,
            Arc::new(EchoDeserializer),
        )
        .retry_strategy(strategy);
        interceptors
            .into_iter()
            .fold(builder, |builder, interceptor| builder.interceptor(interceptor))
            .build()
    }

    fn retrying(clock: &ManualClock) -> Arc<dyn RetryStrategy<String, EchoError>> {
        let config = StandardRetryStrategyConfig::new().max_attempts(5);
        Arc::new(StandardRetryStrategy::with_clock(config, Arc::new(clock.clone())))
    }

    fn context(probe: &Arc<RecordingProbe>, clock: &ManualClock) -> ExecutionContext {
        let span = TraceSpan::root("Echo", probe.clone(), Arc::new(clock.clone()));
        ExecutionContext::with_span("Echo", span)
    }

    fn hooks(log: &Log) -> Vec<String> {
        log.lock().clone()
    }

    fn expected(name: &str, hooks: &[&str]) -> Vec<String> {
        hooks.iter().map(|hook| format!("{name}:{hook}")).collect()
    }

    const ATTEMPT_HOOKS: &[&str] = &[
        "read_before_attempt",
        "modify_before_signing",
        "read_before_signing",
        "read_after_signing",
        "modify_before_transmit",
        "read_before_transmit",
        "read_after_transmit",
        "modify_before_deserialization",
        "read_before_deserialization",
        "read_after_deserialization",
        "modify_before_attempt_completion",
        "read_after_attempt",
    ];

    #[tokio::test]
    async fn test_hooks_run_in_stage_order() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let transport = FlakyTransport::failing(0);
        let execution = execution(
            transport.clone(),
            vec![Arc::new(Recorder::new("a", &log))],
            Arc::new(NoRetryStrategy),
        );

        let output = execution.execute("hello".into(), &context(&probe, &clock)).await;

        assert_eq!(output, Ok("req:hello".to_string()));
        let mut order = vec![
            "read_before_execution",
            "modify_before_serialization",
            "read_before_serialization",
            "read_after_serialization",
            "modify_before_retry_loop",
        ];
        order.extend_from_slice(ATTEMPT_HOOKS);
        order.extend_from_slice(&["modify_before_completion", "read_after_execution"]);
        assert_eq!(hooks(&log), expected("a", &order));
    }

    #[tokio::test]
    async fn test_each_hook_runs_across_interceptors_before_the_next() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let execution = execution(
            FlakyTransport::failing(0),
            vec![Arc::new(Recorder::new("a", &log)), Arc::new(Recorder::new("b", &log))],
            Arc::new(NoRetryStrategy),
        );

        execution.execute("hi".into(), &context(&probe, &clock)).await.unwrap();

        let log = hooks(&log);
        assert_eq!(
            &log[..4],
            &[
                "a:read_before_execution",
                "b:read_before_execution",
                "a:modify_before_serialization",
                "b:modify_before_serialization",
            ]
        );
        assert_eq!(&log[log.len() - 2..], &["a:read_after_execution", "b:read_after_execution"]);
    }

    #[tokio::test]
    async fn test_error_before_retry_loop_skips_to_completion() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let recorder = Recorder::new("a", &log).failing_at("read_before_serialization");
        let completion = recorder.completion.clone();
        let transport = FlakyTransport::failing(0);
        let execution = execution(transport.clone(), vec![Arc::new(recorder)], retrying(&clock));
        let ctx = context(&probe, &clock);

        let result = execution.execute("hello".into(), &ctx).await;

        assert_eq!(result, Err(EchoError::Hook("a")));
        assert_eq!(completion.lock().clone(), vec![Err(EchoError::Hook("a"))]);
        assert_eq!(
            hooks(&log),
            expected(
                "a",
                &[
                    "read_before_execution",
                    "modify_before_serialization",
                    "read_before_serialization",
                    "modify_before_completion",
                    "read_after_execution",
                ]
            )
        );
        assert_eq!(transport.calls(), 0);
        assert_eq!(ctx.attempt(), 0);
        assert_eq!(ctx.span().status(), SpanStatus::Error);
    }

    #[tokio::test]
    async fn test_attempt_hook_error_jumps_to_read_after_attempt() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let transport = FlakyTransport::failing(0);
        let execution = execution(
            transport.clone(),
            vec![Arc::new(Recorder::new("a", &log).failing_at("modify_before_signing"))],
            retrying(&clock),
        );

        let result = execution.execute("hello".into(), &context(&probe, &clock)).await;

        assert_eq!(result, Err(EchoError::Hook("a")));
        assert_eq!(transport.calls(), 0);
        assert_eq!(
            hooks(&log)[5..],
            expected(
                "a",
                &[
                    "read_before_attempt",
                    "modify_before_signing",
                    "read_after_attempt",
                    "modify_before_completion",
                    "read_after_execution",
                ]
            )
        );
        assert!(probe
            .closed_spans()
            .contains(&("Echo/attempt-1".to_string(), SpanStatus::Error)));
    }

    #[tokio::test]
    async fn test_read_hook_errors_latest_wins() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let execution = execution(
            FlakyTransport::failing(0),
            vec![
                Arc::new(Recorder::new("a", &log).failing_at("read_before_execution")),
                Arc::new(Recorder::new("b", &log).failing_at("read_before_execution")),
            ],
            Arc::new(NoRetryStrategy),
        );
        let ctx = context(&probe, &clock);

        let result = execution.execute("hello".into(), &ctx).await;

        assert_eq!(result, Err(EchoError::Hook("b")));
        let suppressed: Vec<_> = ctx.suppressed_errors().iter().map(|e| e.to_string()).collect();
        assert_eq!(suppressed, vec!["interceptor a failed"]);
        assert_eq!(
            hooks(&log)[..3],
            ["a:read_before_execution", "b:read_before_execution", "a:modify_before_completion"]
        );
    }

    #[tokio::test]
    async fn test_read_after_execution_error_replaces_result() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let execution = execution(
            FlakyTransport::failing(0),
            vec![Arc::new(Recorder::new("a", &log).failing_at("read_after_execution"))],
            Arc::new(NoRetryStrategy),
        );

        let result = execution.execute("hello".into(), &context(&probe, &clock)).await;

        assert_eq!(result, Err(EchoError::Hook("a")));
    }

    #[tokio::test]
    async fn test_transport_failures_are_retried() {
        let log = Log::default();
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let transport = FlakyTransport::failing(2);
        let execution = execution(
            transport.clone(),
            vec![Arc::new(Recorder::new("a", &log))],
            retrying(&clock),
        );
        let ctx = context(&probe, &clock);

        let result = execution.execute("hello".into(), &ctx).await;

        assert_eq!(result, Ok("req:hello".to_string()));
        assert_eq!(transport.calls(), 3);
        assert_eq!(ctx.attempt(), 3);
        assert_eq!(clock.sleeps().len(), 2);

        let log = hooks(&log);
        let count = |hook: &str| log.iter().filter(|h| h.ends_with(hook)).count();
        assert_eq!(count(":read_before_attempt"), 3);
        assert_eq!(count(":read_after_attempt"), 3);
        assert_eq!(count(":read_after_transmit"), 1);
        assert_eq!(count(":read_after_execution"), 1);
    }

    #[tokio::test]
    async fn test_modify_hooks_replace_values() {
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let execution = execution(
            FlakyTransport::failing(0),
            vec![Arc::new(Rewriter)],
            Arc::new(NoRetryStrategy),
        );

        let result = execution.execute("hello".into(), &context(&probe, &clock)).await;

        assert_eq!(result, Ok("req:HELLO! (rewritten)".to_string()));
    }

    #[tokio::test]
    async fn test_cancellation_closes_spans() {
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let transport = Arc::new(FlakyTransport {
            hang: true,
            ..FlakyTransport::default()
        });
        let execution = execution(transport.clone(), Vec::new(), retrying(&clock));
        let ctx = context(&probe, &clock);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = execution.execute_cancellable("hello".into(), &ctx, cancel).await;

        assert_eq!(result, Err(EchoError::Runtime(RetryError::Cancelled)));
        assert_eq!(transport.calls(), 1);
        assert!(ctx.span().is_closed());
        let mut closed: Vec<_> = probe.closed_spans().into_iter().map(|(id, _)| id).collect();
        closed.sort();
        assert_eq!(closed, vec!["Echo", "Echo/attempt-1"]);
        assert!(probe
            .messages_from("SpanGuard")
            .iter()
            .all(|m| m == "Span scope cancelled before completion"));
    }

    #[tokio::test]
    async fn test_builtin_interceptors_report_to_span() {
        let probe = Arc::new(RecordingProbe::new());
        let clock = ManualClock::starting_now();
        let execution = execution(
            FlakyTransport::failing(1),
            vec![Arc::new(LoggingInterceptor::new()), Arc::new(AttemptMetricsInterceptor::new())],
            retrying(&clock),
        );
        let ctx = context(&probe, &clock);

        execution.execute("hello".into(), &ctx).await.unwrap();

        let messages = probe.messages_from("LoggingInterceptor");
        assert!(messages.contains(&"Attempt 1 failed: service unavailable".to_string()));
        assert!(messages.contains(&"Attempt 2 succeeded".to_string()));
        assert_eq!(messages.last().map(String::as_str), Some("Echo succeeded after 2 attempt(s)"));

        let metrics = probe.metrics();
        assert!(metrics.contains(&("attempts".to_string(), MetricValue::Count(2))));
        let duration = metrics.iter().find(|(name, _)| name == "execution_duration");
        assert!(matches!(duration, Some((_, MetricValue::Duration(_)))));
        assert_eq!(ctx.span().status(), SpanStatus::Unset);
    }
}

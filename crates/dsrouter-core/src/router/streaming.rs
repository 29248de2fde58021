use super::{DsRouter, RouterCore, Trail, ULTIMATE_FALLBACK_PROVIDER};
use crate::config::BudgetMode;
use crate::confidence::assess;
use crate::error::{Error, Result};
use crate::routing::RoutingDecision;
use crate::security::post_guard::SAFETY_FILTER_PROVIDER;
use crate::stream::{slice_content, ChunkSink, ChunkStream};
use dsrouter_llm::{GenRequest, GenResponse, Metadata, StreamChunk};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

const STREAM_FAILURE_MESSAGE: &str = "I'm sorry, the response was interrupted and no backup provider was available. Please try again shortly.";

impl DsRouter {
    /// Generate a response as a stream of chunks
    ///
    /// Returns immediately; the pipeline runs on a spawned task. Chunk ids
    /// start at 0 and increase by one, and exactly one chunk is final. The
    /// final chunk carries the post-guard verdict on the assembled content.
    /// Dropping the stream cancels the in-flight provider call.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn generate_stream(&self, request: GenRequest) -> ChunkStream {
        let request_id = Uuid::new_v4().to_string();
        let mut base = Metadata::new();
        base.insert("request_id".to_string(), request_id.clone().into());

        let (sink, stream) =
            ChunkStream::channel(self.core.config.streaming.channel_capacity, base);
        let core = Arc::clone(&self.core);
        let span = tracing::info_span!("generate_stream", request_id = %request_id);
        tokio::spawn(
            async move { core.run_stream(request, request_id, sink).await }.instrument(span),
        );
        stream
    }
}

impl RouterCore {
    async fn run_stream(&self, request: GenRequest, request_id: String, mut sink: ChunkSink) {
        let (sanitized, pre) = self.pre_guard.check(&request);
        let mut trail = Trail::new(request_id, &sanitized, pre.status);

        if pre.blocked {
            trail.blocked = true;
            trail.error_kind = Some(Error::BlockedByPreGuard(pre.reason).kind());
            let response = self.refusal(&sanitized.prompt);
            self.send_single(&mut sink, &response).await;
            self.emit_audit(trail.entry(&response));
            return;
        }

        let budget = self.budget.check_budget().await;
        if budget.exceeded {
            if self.budget.mode() == BudgetMode::Hard {
                trail.blocked = true;
                trail.error_kind = Some(Error::BudgetExceeded.kind());
                let response = self.budget_limited(&budget);
                self.send_single(&mut sink, &response).await;
                self.emit_audit(trail.entry(&response));
                return;
            }
            warn!(
                tokens_used = budget.tokens_used,
                "Daily budget exceeded, continuing in warn mode"
            );
        }

        let rag_score = self.rag.score(&sanitized);
        let initial = self.routing.decide(&sanitized.prompt, rag_score);
        trail.routing_reason = Some(initial.reasoning);
        sink.tag("routing_reason", initial.reasoning.as_str());

        let produced = match self.routing.reselect(initial.clone(), &self.breakers) {
            Ok(decision) => {
                sink.tag("routed_provider", decision.provider.as_str());
                let produced = self.produce(&decision, &sanitized, &mut sink).await;
                (decision, produced)
            }
            Err(e) => (initial, Err(e)),
        };

        let (decision, produced) = produced;
        let produced = match produced {
            Ok(produced) => Ok(produced),
            Err(Error::StreamCancelled) => {
                debug!("Stream cancelled by consumer");
                return;
            }
            Err(e) => {
                trail.error_kind = Some(e.kind());
                self.stream_fall_back(&decision, e, &sanitized, &mut sink).await
            }
        };

        match produced {
            Ok((last, mut response)) => {
                trail.bill(&response);
                response.confidence = Some(assess(self.confidence.as_ref(), &response));
                let released = self
                    .release_final(last, response, &sanitized, &mut sink, &mut trail)
                    .await;
                let response = match released {
                    Ok(response) => response,
                    Err(_) => {
                        debug!("Stream cancelled before final chunk");
                        return;
                    }
                };
                self.budget
                    .record_usage(trail.billed_tokens(), trail.billed_usd)
                    .await;
                self.emit_audit(trail.entry(&response));
            }
            Err(Error::StreamCancelled) => debug!("Stream cancelled during fallback"),
            Err(e) => {
                warn!(error = %e, "Stream failed with no fallback left");
                trail.error_kind = Some(Error::StreamUpstreamFailure(e.to_string()).kind());
                let response = GenResponse::new(ULTIMATE_FALLBACK_PROVIDER, STREAM_FAILURE_MESSAGE)
                    .with_confidence(0.0)
                    .with_metadata("degraded", true)
                    .with_metadata("fallback_from", decision.provider.as_str())
                    .with_metadata(
                        "error_kind",
                        Error::StreamUpstreamFailure(String::new()).kind(),
                    );
                self.send_single(&mut sink, &response).await;
                self.emit_audit(trail.entry(&response));
            }
        }
    }

    /// Run the provider and send every chunk but the last
    ///
    /// The last chunk is held back so it can be released as final once the
    /// post-guard has seen the assembled content.
    async fn produce(
        &self,
        decision: &RoutingDecision,
        request: &GenRequest,
        sink: &mut ChunkSink,
    ) -> Result<(StreamChunk, GenResponse)> {
        let native = self
            .providers
            .get(&decision.provider)
            .is_some_and(|provider| provider.supports_streaming());

        if native {
            return self.forward_native(decision, request, sink).await;
        }

        let cancel = sink.cancellation().clone();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::StreamCancelled),
            response = self.call_provider(decision, request) => response?,
        };
        let last = self.replay(&response, sink).await?;
        Ok((last, response))
    }

    async fn forward_native(
        &self,
        decision: &RoutingDecision,
        request: &GenRequest,
        sink: &mut ChunkSink,
    ) -> Result<(StreamChunk, GenResponse)> {
        let name = decision.provider.as_str();
        let provider = self
            .providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ProviderUnavailable(name.to_string()))?;
        let breaker = self.breakers.get(name);
        if !breaker.can_execute() {
            return Err(Error::ProviderUnavailable(name.to_string()));
        }

        let upstream_request = request
            .clone()
            .with_cot_budget(decision.cot_budget)
            .with_stream(true);
        let timeout = self.config.timeouts.for_provider(name, &self.config.tiers);
        let cancel = sink.cancellation().clone();
        let fail = |error: dsrouter_llm::Error| {
            if error.is_retryable() {
                breaker.record_failure();
            }
            warn!(provider = %name, error = %error, "Upstream stream failed");
            if error.is_timeout() {
                Error::ProviderTimeout {
                    provider: name.to_string(),
                    attempts: 1,
                }
            } else {
                Error::Provider {
                    provider: name.to_string(),
                    source: error,
                }
            }
        };
        let timeout_error =
            || dsrouter_llm::Error::Timeout(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

        let mut upstream = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::StreamCancelled),
            opened = tokio::time::timeout(timeout, provider.generate_stream(&upstream_request)) => {
                match opened {
                    Ok(Ok(upstream)) => upstream,
                    Ok(Err(e)) => return Err(fail(e)),
                    Err(_) => return Err(fail(timeout_error())),
                }
            }
        };

        let mut assembled = String::new();
        let mut held: Option<StreamChunk> = None;
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::StreamCancelled),
                next = tokio::time::timeout(timeout, upstream.next()) => next,
            };
            match next {
                Ok(Some(Ok(chunk))) => {
                    assembled.push_str(&chunk.content);
                    if let Some(previous) = held.replace(chunk) {
                        sink.send(previous).await?;
                    }
                }
                Ok(Some(Err(e))) => {
                    if let Some(previous) = held.take() {
                        sink.send(previous).await?;
                    }
                    return Err(fail(e));
                }
                Ok(None) => break,
                Err(_) => {
                    if let Some(previous) = held.take() {
                        sink.send(previous).await?;
                    }
                    return Err(fail(timeout_error()));
                }
            }
        }

        breaker.record_success();
        let last = held.unwrap_or_else(|| StreamChunk::new(name, ""));
        let mut response = GenResponse::new(name, assembled);
        self.meter(&mut response, request);
        Ok((last, response))
    }

    /// Send a complete response as simulated chunks, holding back the last
    async fn replay(&self, response: &GenResponse, sink: &mut ChunkSink) -> Result<StreamChunk> {
        let delay = Duration::from_millis(self.config.streaming.chunk_delay_ms);
        let mut pieces = slice_content(&response.content, self.config.streaming.chunk_size);
        let last = pieces.pop().unwrap_or_default();

        for piece in pieces {
            sink.send(StreamChunk::new(response.provider.as_str(), piece))
                .await?;
            if !delay.is_zero() {
                tokio::select! {
                    _ = sink.cancellation().cancelled() => return Err(Error::StreamCancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
        Ok(StreamChunk::new(response.provider.as_str(), last))
    }

    /// One attempt on the local tier after the routed provider failed
    async fn stream_fall_back(
        &self,
        decision: &RoutingDecision,
        error: Error,
        request: &GenRequest,
        sink: &mut ChunkSink,
    ) -> Result<(StreamChunk, GenResponse)> {
        let local = self
            .local_decision(&decision.provider, decision.reasoning)
            .ok_or_else(|| Error::StreamUpstreamFailure(error.to_string()))?;

        let cancel = sink.cancellation().clone();
        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::StreamCancelled),
            response = self.call_provider(&local, request) => response?,
        };

        info!(
            from = %decision.provider,
            to = %local.provider,
            reason = error.kind(),
            "Stream fell back to local provider"
        );
        sink.tag("fallback_from", decision.provider.as_str());
        sink.tag("fallback_reason", error.kind());

        let last = self.replay(&response, sink).await?;
        Ok((last, response))
    }

    /// Post-guard the assembled content and send the final chunk
    async fn release_final(
        &self,
        mut last: StreamChunk,
        response: GenResponse,
        request: &GenRequest,
        sink: &mut ChunkSink,
        trail: &mut Trail,
    ) -> Result<GenResponse> {
        let (delivered, post) = self.post_guard.check(&request.prompt, &response);
        trail.post_guard = Some(post.status);

        if post.blocked {
            trail.blocked = true;
            trail.error_kind = Some(Error::BlockedByPostGuard(post.reason).kind());
            last.content = delivered.content.clone();
            last.provider = SAFETY_FILTER_PROVIDER.to_string();
            last.metadata
                .insert("post_guard".to_string(), "blocked".into());
        } else if let Some(note) = delivered.content.strip_prefix(response.content.as_str()) {
            last.content.push_str(note);
        }
        last.metadata
            .insert("post_guard_status".to_string(), post.status.as_str().into());
        if let Some(confidence) = delivered.confidence {
            last.metadata
                .insert("confidence".to_string(), f64::from(confidence).into());
        }

        sink.finish(last).await?;
        Ok(delivered)
    }

    /// Send a response as the only, final chunk
    async fn send_single(&self, sink: &mut ChunkSink, response: &GenResponse) {
        let mut chunk = StreamChunk::new(response.provider.as_str(), response.content.as_str());
        chunk.metadata = response.metadata.clone();
        if sink.finish(chunk).await.is_err() {
            debug!("Consumer gone before terminal chunk");
        }
    }
}

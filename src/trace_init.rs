#[cfg(feature = "trace")]
use std::path::Path;
#[cfg(feature = "trace")]
use std::sync::Once;

#[cfg(feature = "trace")]
static INIT: Once = Once::new();

/// How much of a decode ends up in the trace file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraceDetail {
    /// One record per sentence: the closed `decode` span (with its
    /// `sentence_id` and timing), pool events, load messages.
    #[default]
    Sentences,
    /// Also every chart cell, stack, rule sort and k-best extraction.
    Search,
}

impl TraceDetail {
    /// Filter used when `RUST_LOG` is not set.
    pub fn default_filter(self) -> &'static str {
        match self {
            TraceDetail::Sentences => "syndec=info,syndec_core=info,syndec_core::decoder=debug",
            TraceDetail::Search => "syndec=debug,syndec_core=trace",
        }
    }
}

/// Installs a JSON-lines subscriber writing `syndec-trace.jsonl` under
/// `log_dir`. Only the first call has an effect.
///
/// Records carry the worker thread name and the enclosing span list, so
/// every event inside a sentence's `decode` span can be grouped by its
/// `sentence_id`.
#[cfg(feature = "trace")]
pub fn init_tracing(log_dir: &Path, detail: TraceDetail) {
    use tracing_subscriber::fmt::format::FmtSpan;

    INIT.call_once(|| {
        let file_appender = tracing_appender::rolling::never(log_dir, "syndec-trace.jsonl");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        std::mem::forget(guard); // flushed for the life of the process

        let span_events = match detail {
            TraceDetail::Sentences => FmtSpan::CLOSE,
            TraceDetail::Search => FmtSpan::NEW | FmtSpan::CLOSE,
        };
        tracing_subscriber::fmt()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_names(true)
            .with_current_span(true)
            .with_span_list(true)
            .with_span_events(span_events)
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(detail.default_filter())
                }),
            )
            .init();
    });
}

#[cfg(not(feature = "trace"))]
pub fn init_tracing(_log_dir: &std::path::Path, _detail: TraceDetail) {}

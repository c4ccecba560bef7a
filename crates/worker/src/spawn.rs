use std::future::Future;
use std::sync::OnceLock;

use tokio::task::JoinHandle;

use crate::TaskClass;

fn runtime_handle() -> tokio::runtime::Handle {
	if let Ok(handle) = tokio::runtime::Handle::try_current() {
		return handle;
	}

	static GLOBAL_RT: OnceLock<tokio::runtime::Runtime> = OnceLock::new();
	let runtime = GLOBAL_RT.get_or_init(|| {
		tokio::runtime::Builder::new_multi_thread()
			.enable_all()
			.worker_threads(2)
			.thread_name("lemma-worker-global")
			.build()
			.expect("failed to build lemma-worker global tokio runtime")
	});
	runtime.handle().clone()
}

/// Spawns an async task tagged with a worker class.
///
/// Falls back to a lazily built global runtime when called outside of one,
/// so foreground callers without a runtime can still request background runs.
pub fn spawn<F>(class: TaskClass, fut: F) -> JoinHandle<F::Output>
where
	F: Future + Send + 'static,
	F::Output: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn");
	runtime_handle().spawn(fut)
}

/// Spawns blocking work tagged with a worker class.
pub fn spawn_blocking<F, R>(class: TaskClass, f: F) -> JoinHandle<R>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(worker_class = class.as_str(), "worker.spawn_blocking");
	runtime_handle().spawn_blocking(f)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn spawn_outside_runtime_uses_global_runtime() {
		let handle = spawn(TaskClass::Background, async { 7 });
		let value = runtime_handle().block_on(handle).unwrap();
		assert_eq!(value, 7);
	}

	#[tokio::test]
	async fn spawn_blocking_runs_on_current_runtime() {
		let out = spawn_blocking(TaskClass::CpuBlocking, || std::thread::current().name().map(str::to_owned))
			.await
			.unwrap();
		assert_ne!(out.as_deref(), Some("lemma-worker-global"));
	}
}

/// Shared execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work on the critical path of an index run (graph nodes, the event loop).
	Pipeline,
	/// Detached side-effect work that must never block publication.
	Background,
	/// CPU-intensive blocking work executed on the blocking pool.
	CpuBlocking,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Pipeline => "pipeline",
			Self::Background => "background",
			Self::CpuBlocking => "cpu_blocking",
		}
	}
}

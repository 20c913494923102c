//! Reference consumer for `maskring`.
//!
//! [`RenderQueue`] is an ordered, byte-encoded [`CommandSink`](maskring::CommandSink)
//! whose records are executed by an [`Executor`] holding the ring's
//! `ConsumerHandle`. A [`Drainer`] flushes the queue from a background thread
//! so the producer and consumer run concurrently, and [`Workload`] produces
//! seeded fill jobs whose mask bytes the executor can verify after the fact.
//!
//! # Example
//!
//! ```
//! use maskring::{Config, MaskRing};
//! use maskring_sim::{Drainer, Executor, RenderQueue, Workload};
//!
//! let config = Config::new(64 * 1024, 4);
//! let (mut ring, consumer) = MaskRing::new(config).unwrap();
//! let mut queue = RenderQueue::new(Executor::new(consumer));
//! let drainer = Drainer::spawn(queue.clone()).unwrap();
//!
//! let jobs: Vec<_> = Workload::new(1, config.max_allocation()).take(200).collect();
//! for job in &jobs {
//!     job.submit(&mut ring, &mut queue).unwrap();
//! }
//! drainer.shutdown().unwrap();
//!
//! let fills = queue.with_executor(|executor| executor.take_fills());
//! assert_eq!(fills.len(), jobs.len());
//! for (job, executed) in jobs.iter().zip(&fills) {
//!     assert_eq!(executed.digest, job.expected_digest());
//! }
//! ```

mod drainer;
mod executor;
mod queue;
mod workload;

pub use drainer::Drainer;
pub use executor::{digest, ExecError, ExecutedFill, Executor, ExecutorStats};
pub use queue::RenderQueue;
pub use workload::{Job, Workload};

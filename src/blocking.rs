//! Synchronous orchestrator.
//!
//! Wraps the async [`rag::RagSystem`](crate::rag::RagSystem) with an owned
//! current-thread tokio runtime; every method blocks until the operation
//! completes. `batch_query` still runs its questions concurrently inside
//! that runtime.
//!
//! Must not be called from within an async runtime: `block_on` panics there.
//! Async callers use [`crate::rag::RagSystem`] directly.
//!
//! ```no_run
//! use oran_nephio_rag::blocking::RagSystem;
//! use oran_nephio_rag::config::Config;
//!
//! let rag = RagSystem::new(Config::parse("").unwrap()).unwrap();
//! rag.build_vector_database().unwrap();
//! rag.setup_qa_chain().unwrap();
//! println!("{}", rag.query("What is Nephio?").unwrap().answer);
//! ```

use tokio::runtime::{Builder, Runtime};

use crate::config::Config;
use crate::error::{RagError, Result};
use crate::models::{BuildReport, Health, QueryResult, RagState, SystemStatus};
use crate::rag::{self, RagParts};

pub struct RagSystem {
    runtime: Runtime,
    inner: rag::RagSystem,
}

fn runtime() -> Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| RagError::Internal(e.into()))
}

impl RagSystem {
    pub fn new(config: Config) -> Result<Self> {
        let runtime = runtime()?;
        let inner = runtime.block_on(rag::RagSystem::new(config))?;
        Ok(Self { runtime, inner })
    }

    pub fn from_parts(config: Config, parts: RagParts) -> Result<Self> {
        Ok(Self {
            runtime: runtime()?,
            inner: rag::RagSystem::from_parts(config, parts),
        })
    }

    /// The wrapped async orchestrator.
    pub fn inner(&self) -> &rag::RagSystem {
        &self.inner
    }

    pub fn state(&self) -> RagState {
        self.runtime.block_on(self.inner.state())
    }

    pub fn build_vector_database(&self) -> Result<BuildReport> {
        self.runtime.block_on(self.inner.build_vector_database())
    }

    pub fn update_database(&self) -> Result<BuildReport> {
        self.runtime.block_on(self.inner.update_database())
    }

    pub fn load_existing_database(&self) -> Result<()> {
        self.runtime.block_on(self.inner.load_existing_database())
    }

    pub fn setup_qa_chain(&self) -> Result<()> {
        self.runtime.block_on(self.inner.setup_qa_chain())
    }

    pub fn query(&self, question: &str) -> Result<QueryResult> {
        self.runtime.block_on(self.inner.query(question))
    }

    pub fn batch_query(&self, questions: &[String]) -> Result<Vec<QueryResult>> {
        self.runtime.block_on(self.inner.batch_query(questions))
    }

    pub fn health(&self) -> Health {
        self.runtime.block_on(self.inner.health())
    }

    pub fn status(&self) -> Result<SystemStatus> {
        self.runtime.block_on(self.inner.status())
    }
}

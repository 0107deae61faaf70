//! # docqa
//!
//! A local-first retrieval-augmented Q&A service for documentation
//! corpora.
//!
//! docqa ingests a directory of markdown documents into a SQLite-backed
//! vector index, then answers questions against it: queries are classified
//! by intent, matched by embedding similarity, reranked with intent-aware
//! boosts and penalties, and fed as context to a chat model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────┐
//! │  Docs    │──▶│   Ingestion   │──▶│  SQLite  │
//! │ (*.md)   │   │ Chunk+Embed  │   │  index   │
//! └──────────┘   └──────────────┘   └────┬─────┘
//!                                        │
//!              ┌─────────────────────────┤
//!              ▼                         ▼
//!        ┌───────────┐            ┌───────────┐
//!        │ Retrieval │───────────▶│  Answer   │
//!        │ intent+   │            │ LLM + conv │
//!        │ rerank    │            │  history  │
//!        └───────────┘            └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! docqa ingest                    # index the docs directory
//! docqa query "how do I set up a proxy?"
//! docqa ask "how do I set up a proxy?"   # retrieval + LLM answer
//! docqa stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`preprocess`] | Frontmatter extraction and content cleanup |
//! | [`chunk`] | Heading-aware markdown chunking |
//! | [`embedding`] | Embedding gateway abstraction |
//! | [`store`] | Chunk index storage backends |
//! | [`intent`] | Query intent classification |
//! | [`rerank`] | Intent-aware candidate reranking |
//! | [`expand`] | Rule-based query expansion |
//! | [`retrieval`] | Retrieval orchestration |
//! | [`ingest`] | Incremental document ingestion |
//! | [`llm`] | Chat-completion client |
//! | [`conversation`] | Conversation history persistence |
//! | [`answer`] | End-to-end question answering |

pub mod answer;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod expand;
pub mod ingest;
pub mod intent;
pub mod llm;
pub mod models;
pub mod preprocess;
pub mod rerank;
pub mod retrieval;
pub mod store;

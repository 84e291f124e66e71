pub mod db;
pub mod memory;
pub mod prefetch;
pub mod question_llm;
pub mod similarity;

pub use db::PgAdapter;
pub use memory::InMemoryDb;
pub use prefetch::InMemoryPrefetchCache;
pub use question_llm::OpenAiQuestionAdapter;
pub use similarity::TokenOverlapSimilarity;

//! SeaORM entity models
//!
//! Database entities for ExpertScope

mod author;
mod authorship;
mod chunk;
mod fetch_run;
mod paper;
mod paper_topic;
mod search_audit;
mod topic;

pub use paper::{
    Entity as PaperEntity,
    Model as Paper,
    ActiveModel as PaperActiveModel,
    Column as PaperColumn,
};

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};

pub use author::{
    Entity as AuthorEntity,
    Model as Author,
    ActiveModel as AuthorActiveModel,
    Column as AuthorColumn,
};

pub use topic::{
    Entity as TopicEntity,
    Model as Topic,
    ActiveModel as TopicActiveModel,
    Column as TopicColumn,
};

pub use authorship::{
    Entity as AuthorshipEntity,
    Model as Authorship,
    ActiveModel as AuthorshipActiveModel,
    Column as AuthorshipColumn,
};

pub use paper_topic::{
    Entity as PaperTopicEntity,
    Model as PaperTopic,
    ActiveModel as PaperTopicActiveModel,
    Column as PaperTopicColumn,
};

pub use search_audit::{
    Entity as SearchAuditEntity,
    Model as SearchAudit,
    ActiveModel as SearchAuditActiveModel,
    Column as SearchAuditColumn,
};

pub use fetch_run::{
    Entity as FetchRunEntity,
    Model as FetchRun,
    ActiveModel as FetchRunActiveModel,
    Column as FetchRunColumn,
    RunStatus,
};

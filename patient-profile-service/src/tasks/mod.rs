pub mod extract_documents;
pub mod generate_advice;
pub mod merge_profile;
pub mod prompts;

pub use extract_documents::ExtractDocumentsTask;
pub use generate_advice::GenerateAdviceTask;
pub use merge_profile::MergeProfileTask;

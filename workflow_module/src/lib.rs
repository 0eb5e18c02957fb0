pub mod parameterize;
pub mod selector;
pub mod templates;

pub use parameterize::{parameterize, WorkflowParams};
pub use selector::{select_workflow, SelectedWorkflow};
pub use templates::{Industry, TemplateRegistry, TemplateTier};

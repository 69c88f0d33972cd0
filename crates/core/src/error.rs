use pio_types::PrimitiveError;
use pio_uuid::UuidError;

#[derive(Debug, thiserror::Error)]
pub enum PioError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("Path does not exist: {0}")]
    PathNotFound(String),
    #[error("Path does not point to a primitive value: {0}")]
    NotPrimitive(String),
    #[error("malformed path: {0}")]
    MalformedPath(String),
    #[error("narrative at {path} is not a well-formed XHTML fragment: {reason}")]
    InvalidNarrative { path: String, reason: String },
    #[error("resource {uuid} is a {existing}, cannot write a {requested} path to it")]
    ResourceTypeConflict {
        uuid: String,
        existing: String,
        requested: String,
    },

    #[error("Uuid does not exist: {0}")]
    AuthorNotFound(String),
    #[error("No receiving institution stated")]
    NoReceivingInstitution,

    #[error("No FHIR resources found")]
    NoResources,
    #[error("No Bundle found")]
    NoBundle,

    #[error("No author is stated but this information is mandatory")]
    MissingAuthor,
    #[error("No patient resource found but this resource is mandatory")]
    MissingPatient,
    #[error("More than one patient resource found. Just one is allowed")]
    DuplicatePatient,
    #[error("Xml generation failed. Invalid paths detected: \n{}", .0.join("\n"))]
    InvalidPaths(Vec<String>),
    #[error("resource type {0} is not part of the schema table")]
    UnknownResourceType(String),

    #[error("schema table error: {0}")]
    Schema(String),
    #[error("failed to read schema table: {0}")]
    SchemaRead(std::io::Error),
    #[error("failed to parse schema table: {0}")]
    SchemaParse(serde_json::Error),

    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error(transparent)]
    Uuid(#[from] UuidError),
    #[error("FHIR XML error: {0}")]
    Fhir(#[from] fhir::FhirError),
}

pub type PioResult<T> = std::result::Result<T, PioError>;

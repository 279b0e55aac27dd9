#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    serde::Serialize,
    serde::Deserialize,
    strum::Display,
    strum::AsRefStr,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ErrorCode {
    BadRequest,
    InternalServerError,
    // Operation preparation
    OperationPlanningError,
    // Field resolution
    FieldError,
    NullConstraintViolation,
    InvalidResolverValue,
    // Batch loading
    LoaderError,
    // Request lifecycle
    RequestCancelled,
}

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, StatusCode};

/// Diagnostic attached to an operation by the server. Issues nest.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub issue_code: u32,
    #[serde(default)]
    pub severity: u32,
    #[serde(default)]
    pub issues: Vec<Issue>,
}

/// Opaque result of an operation, decoded by the typed service layer.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    #[serde(default)]
    pub type_url: String,
    #[serde(default)]
    pub value: Bytes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub ready: bool,
    pub status: StatusCode,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub result: Option<OperationResult>,
}

impl Operation {
    pub fn ready(status: StatusCode) -> Self {
        Self {
            id: String::new(),
            ready: true,
            status,
            issues: Vec::new(),
            result: None,
        }
    }

    pub fn with_result(mut self, value: impl Into<Bytes>) -> Self {
        self.result = Some(OperationResult {
            type_url: String::new(),
            value: value.into(),
        });
        self
    }

    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Raises the status as an error unless it is `SUCCESS`.
    pub fn check_status(&self) -> Result<(), Error> {
        if self.status.is_success() {
            return Ok(());
        }
        Err(Error::from_status(self.status, self.issues.clone()))
    }

    fn payload(&self) -> Option<&Bytes> {
        self.result.as_ref().map(|result| &result.value)
    }
}

/// Any response whose outcome is reported through an operation envelope.
pub trait OperationResponse {
    fn operation(&self) -> Option<&Operation>;
}

/// Generic envelope for services that answer with nothing but an operation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    #[serde(default)]
    pub operation: Option<Operation>,
}

impl OperationEnvelope {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation: Some(operation),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

impl OperationResponse for OperationEnvelope {
    fn operation(&self) -> Option<&Operation> {
        self.operation.as_ref()
    }
}

/// Extracts the result payload, raising for a missing operation, a non-success
/// status or an absent payload.
pub fn operation_payload<R: OperationResponse + ?Sized>(response: &R) -> Result<Bytes, Error> {
    let operation = response.operation().ok_or(Error::MissingOperation)?;
    operation.check_status()?;
    operation.payload().cloned().ok_or(Error::MissingValue)
}

/// Returns the payload of a successful operation. A failure status always
/// raises; `suppressed` only turns a missing payload into `Ok(None)` when the
/// operation status is listed there.
pub fn unwrap_operation<R: OperationResponse + ?Sized>(
    response: &R,
    suppressed: &[StatusCode],
) -> Result<Option<Bytes>, Error> {
    let operation = response.operation().ok_or(Error::MissingOperation)?;
    operation.check_status()?;
    match operation.payload() {
        Some(payload) => Ok(Some(payload.clone())),
        None if suppressed.contains(&operation.status) => Ok(None),
        None => Err(Error::MissingValue),
    }
}

/// Succeeds when the operation finished successfully, with or without a
/// payload, or when its failure status is listed in `suppressed`.
pub fn ensure_operation_succeeded<R: OperationResponse + ?Sized>(
    response: &R,
    suppressed: &[StatusCode],
) -> Result<(), Error> {
    match operation_payload(response) {
        Ok(_) | Err(Error::MissingValue) => Ok(()),
        Err(error) if suppressed.contains(&error.status()) => Ok(()),
        Err(error) => Err(error),
    }
}

pub(crate) fn render_issues(message: &str, issues: &[Issue]) -> String {
    if issues.is_empty() {
        return message.to_owned();
    }
    let mut rendered = String::from(message);
    rendered.push_str("; issues: ");
    render_issue_list(&mut rendered, issues);
    rendered
}

fn render_issue_list(out: &mut String, issues: &[Issue]) {
    for (index, issue) in issues.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        out.push_str(&format!(
            "[{}] {} (severity {})",
            issue.issue_code, issue.message, issue.severity
        ));
        if !issue.issues.is_empty() {
            out.push_str(" { ");
            render_issue_list(out, &issue.issues);
            out.push_str(" }");
        }
    }
}

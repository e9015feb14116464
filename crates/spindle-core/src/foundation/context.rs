//! Per-request state carried through every dispatch stage.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::request::Request;
use super::response::Response;

/// Where a request currently is in the dispatch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchStage {
    /// Selecting a route.
    Routing,
    /// Handing the request to the route's scheduler.
    Scheduling,
    /// Building handler arguments.
    ResolvingParams,
    /// Awaiting the handler.
    Invoking,
    /// Writing the handler's return value.
    ResolvingResponse,
    /// A response has been produced normally.
    Done,
    /// A failure is being turned into a response.
    ExceptionHandling,
}

impl DispatchStage {
    /// Returns the stage name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Routing => "routing",
            Self::Scheduling => "scheduling",
            Self::ResolvingParams => "resolving_params",
            Self::Invoking => "invoking",
            Self::ResolvingResponse => "resolving_response",
            Self::Done => "done",
            Self::ExceptionHandling => "exception_handling",
        }
    }
}

impl fmt::Display for DispatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variables extracted from the matched path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMatch {
    variables: Vec<(String, String)>,
    matrix: HashMap<String, Vec<(String, String)>>,
}

impl PathMatch {
    /// Creates an empty match.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a path variable.
    pub fn push_variable(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.push((name.into(), value.into()));
    }

    /// Records a matrix parameter for the segment bound to `path_var`.
    pub fn push_matrix(
        &mut self,
        path_var: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) {
        self.matrix
            .entry(path_var.into())
            .or_default()
            .push((name.into(), value.into()));
    }

    /// A path variable's value.
    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All path variables in pattern order.
    pub fn variables(&self) -> &[(String, String)] {
        &self.variables
    }

    /// The first value of a matrix parameter.
    pub fn matrix_variable(&self, path_var: &str, name: &str) -> Option<&str> {
        self.matrix
            .get(path_var)?
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All values of a matrix parameter.
    pub fn matrix_values<'a, 'b>(
        &'a self,
        path_var: &str,
        name: &'b str,
    ) -> impl Iterator<Item = &'a str> + use<'a, 'b> {
        self.matrix
            .get(path_var)
            .into_iter()
            .flatten()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// State of one request as it moves through the dispatcher.
///
/// A context is owned by exactly one flow at a time: it is created on the
/// dispatching task, moved to a scheduler worker, and dropped once the
/// response has been produced.
pub struct RequestContext {
    id: u64,
    request: Arc<Request>,
    response: Response,
    path: PathMatch,
    stage: DispatchStage,
    attributes: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl RequestContext {
    /// Creates a context for `request`.
    pub fn new(id: u64, request: Arc<Request>) -> Self {
        Self {
            id,
            request,
            response: Response::default(),
            path: PathMatch::new(),
            stage: DispatchStage::Routing,
            attributes: HashMap::new(),
        }
    }

    /// The dispatcher-assigned request id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The request.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// A shared handle to the request.
    pub fn request_arc(&self) -> Arc<Request> {
        Arc::clone(&self.request)
    }

    /// The response under construction.
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Mutable access to the response under construction.
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Replaces the response.
    pub fn set_response(&mut self, response: Response) {
        self.response = response;
    }

    /// Takes the response, leaving an empty one.
    pub fn take_response(&mut self) -> Response {
        std::mem::take(&mut self.response)
    }

    /// Variables of the matched route.
    pub fn path_match(&self) -> &PathMatch {
        &self.path
    }

    /// Stores the variables of the matched route.
    pub fn set_path_match(&mut self, path: PathMatch) {
        self.path = path;
    }

    /// A path variable's value.
    pub fn path_variable(&self, name: &str) -> Option<&str> {
        self.path.variable(name)
    }

    /// A matrix parameter's first value.
    pub fn matrix_variable(&self, path_var: &str, name: &str) -> Option<&str> {
        self.path.matrix_variable(path_var, name)
    }

    /// The current stage.
    pub fn stage(&self) -> DispatchStage {
        self.stage
    }

    /// Moves to another stage.
    pub fn set_stage(&mut self, stage: DispatchStage) {
        self.stage = stage;
    }

    /// Stores a typed attribute, replacing any previous one of the same type.
    pub fn insert<T: Any + Send>(&mut self, value: T) -> Option<T> {
        self.attributes
            .insert(TypeId::of::<T>(), Box::new(value))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|old| *old)
    }

    /// Borrows a typed attribute.
    pub fn get<T: Any + Send>(&self) -> Option<&T> {
        self.attributes
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    /// Removes a typed attribute.
    pub fn remove<T: Any + Send>(&mut self) -> Option<T> {
        self.attributes
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("stage", &self.stage)
            .field("attributes", &self.attributes.len())
            .finish_non_exhaustive()
    }
}

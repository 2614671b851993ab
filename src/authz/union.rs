use async_trait::async_trait;

use super::{Attributes, AuthzError, Authorizer};

/// Evaluates an ordered list of authorizers, granting on the first success.
///
/// - Authorizers are tried in the order given at construction
/// - The first grant ends the evaluation, later authorizers are never consulted
/// - If every authorizer denies, the denials are aggregated in order
/// - An empty union denies with an empty reason set
pub struct UnionAuthorizer {
    authorizers: Vec<Box<dyn Authorizer>>,
}

impl UnionAuthorizer {
    pub fn new(authorizers: Vec<Box<dyn Authorizer>>) -> Self {
        Self { authorizers }
    }

    pub fn len(&self) -> usize {
        self.authorizers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorizers.is_empty()
    }
}

#[async_trait]
impl Authorizer for UnionAuthorizer {
    async fn authorize(&self, attrs: &Attributes) -> Result<(), AuthzError> {
        let mut errors = Vec::with_capacity(self.authorizers.len());
        for authorizer in self.authorizers.iter() {
            match authorizer.authorize(attrs).await {
                Ok(()) => return Ok(()),
                Err(e) => errors.push(e),
            }
        }

        Err(AuthzError::Aggregate(errors))
    }
}

//! Label metadata and label-expression filtering
//!
//! Entities that carry a `labels` map implement [`LabelsAware`]; a
//! [`LabelExpression`] compiled once from an operator-supplied string can
//! then be evaluated against any number of them.
//!
//! ```
//! use std::collections::HashMap;
//! use capability_gateway::labels::LabelExpression;
//!
//! let expr = LabelExpression::parse("(category=weather | category=news) & !action=forecast").unwrap();
//! let labels = HashMap::from([("category".to_string(), "news".to_string())]);
//! assert!(expr.evaluate(&labels));
//! ```

mod parser;

pub use parser::{LabelExpression, LabelExpressionError, MAX_EXPRESSION_LENGTH};

use std::collections::HashMap;

/// Key/value label metadata (keys unique, order irrelevant)
pub type Labels = HashMap<String, String>;

/// Any domain object that exposes a labels map
pub trait LabelsAware {
    /// The entity's labels
    fn labels(&self) -> &Labels;
}

impl LabelsAware for Labels {
    fn labels(&self) -> &Labels {
        self
    }
}

impl<T: LabelsAware + ?Sized> LabelsAware for &T {
    fn labels(&self) -> &Labels {
        (**self).labels()
    }
}

/// Filter `items` by an optional label expression.
///
/// `None` or a blank filter keeps everything; a malformed filter is an error,
/// never a silent empty result.
pub fn filter_by_expression<E: LabelsAware>(
    items: Vec<E>,
    filter: Option<&str>,
) -> Result<Vec<E>, LabelExpressionError> {
    match filter.map(str::trim) {
        None | Some("") => Ok(items),
        Some(expression) => {
            let expression = LabelExpression::parse(expression)?;
            Ok(expression.filter(items))
        }
    }
}

//! Built-in system prompt template

use chrono::NaiveDate;

/// Replaced by the current date when the template is instantiated
pub const DATE_PLACEHOLDER: &str = "{{date}}";

/// System prompt teaching the model the `<API>` call convention.
/// Contains the `{{plugins}}` placeholder filled by the registry.
pub const DEFAULT_TEMPLATE: &str = r#"
# SYSTEM MESSAGE
You are a large language model trained to assist humans.
Current date: {{date}}
Below is a list of available APIs that you can utilize to fulfill user requests.
When using an API, please follow the specified format to make the API call.
Don't ask follow-up questions and aim to complete the task with the information provided by the user.

To make an API call, use the following format:

<API>namespace.operationId({"parameter_name": "parameter_value", ...})</API>

For example, to call an API operation with the operation ID "productsUsingGET" in the "KlarnaProducts" namespace,
and provide the required parameters "q" and "size", the format would be as follows:

<API>KlarnaProducts.productsUsingGET({"q": "t-shirt", "size": 3})</API>

Please ensure that you use the correct namespace and operation ID, and provide the necessary parameters for each API call.
After requesting the API, refrain from writing anything else and wait for the API response, which will be delivered in a new message.

## Plugins description ('*' for required parameters):

{{plugins}}
# USER MESSAGE
"#;

/// [`DEFAULT_TEMPLATE`] with the date filled in
#[must_use]
pub fn default_template(today: NaiveDate) -> String {
    DEFAULT_TEMPLATE.replace(DATE_PLACEHOLDER, &today.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PLUGINS_PLACEHOLDER;

    #[test]
    fn test_default_template() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let template = default_template(date);
        assert!(template.contains("Current date: 2024-05-01"));
        assert!(!template.contains(DATE_PLACEHOLDER));
        assert_eq!(template.matches(PLUGINS_PLACEHOLDER).count(), 1);
    }
}

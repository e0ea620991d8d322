//! Endpoint template rendering.

use conveyor_dispatch::Job;

/// Render an endpoint template by substituting job fields.
///
/// Supported placeholders: `{uid}` and `{content_type}`. Unknown placeholders
/// are left untouched so a misconfigured template shows up verbatim in logs
/// rather than silently collapsing.
pub fn render_endpoint(template: &str, job: &Job) -> String {
    template
        .replace("{uid}", &job.uid)
        .replace("{content_type}", job.content_type.as_deref().unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job(uid: &str, content_type: Option<&str>) -> Job {
        Job {
            uid: uid.to_string(),
            data: json!({}),
            content_type: content_type.map(str::to_string),
        }
    }

    #[test]
    fn substitutes_uid() {
        assert_eq!(
            render_endpoint("/objects/{uid}/writable", &job("abc", None)),
            "/objects/abc/writable"
        );
    }

    #[test]
    fn substitutes_content_type() {
        assert_eq!(
            render_endpoint("/objects/{uid}.{content_type}", &job("abc", Some("xml"))),
            "/objects/abc.xml"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        assert_eq!(
            render_endpoint("/objects/{unknown}", &job("abc", None)),
            "/objects/{unknown}"
        );
    }
}

//! The static upload form.

use axum::response::Html;

pub const UPLOAD_FORM: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>File Upload</title>
</head>
<body>
  <h2>File Upload</h2>
  <form action="/" method="post" enctype="multipart/form-data">
    <input type="file" name="file" required />
    <button type="submit">Upload</button>
  </form>
</body>
</html>
"#;

pub async fn upload_form() -> Html<&'static str> {
    tracing::debug!("Rendering upload form");
    Html(UPLOAD_FORM)
}

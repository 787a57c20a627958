//! HTML pages.
//!
//! Every value that came from the identity provider goes through [`escape_html`].

use oidc_pkce_client::AuthenticatedSession;

pub fn escape_html(unsafe_str: &str) -> String {
    unsafe_str
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#039;")
}

const STYLE: &str = r#"
        body { font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; margin: 40px; }
        .button { background: #007bff; color: white; padding: 10px 20px; text-decoration: none; border-radius: 4px; }
        .button.danger { background: #dc3545; }
        dt { font-weight: bold; margin-top: 12px; }
"#;

pub fn entry_page() -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Login with Keycloak</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>Welcome</h1>
    <p>Please login to continue:</p>
    <a href="/login" class="button">Login with Keycloak</a>
</body>
</html>
"#
    )
}

pub fn home_page(session: &AuthenticatedSession) -> String {
    let profile = &session.profile;
    let field = |value: Option<&str>| escape_html(value.unwrap_or("Not provided"));

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Dashboard</title>
    <style>{STYLE}</style>
</head>
<body>
    <h1>Welcome, {welcome}!</h1>
    <dl>
        <dt>Name</dt><dd>{name}</dd>
        <dt>Email</dt><dd>{email}</dd>
        <dt>Username</dt><dd>{username}</dd>
        <dt>Subject</dt><dd>{sub}</dd>
        <dt>Signed in</dt><dd>{signed_in}</dd>
    </dl>
    <a href="/logout" class="button danger">Logout</a>
</body>
</html>
"#,
        welcome = escape_html(profile.display_name()),
        name = field(profile.name.as_deref()),
        email = field(profile.email.as_deref()),
        username = field(profile.preferred_username.as_deref()),
        sub = escape_html(&profile.sub),
        signed_in = session.authenticated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<script>alert("x") & 'y'</script>"#),
            "&lt;script&gt;alert(&quot;x&quot;) &amp; &#039;y&#039;&lt;/script&gt;"
        );
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_entry_page_links_to_login() {
        assert!(entry_page().contains(r#"href="/login""#));
    }
}

//! services/template_renderer.rs
//! Sustitución de placeholders `{{campo}}` con los datos del destinatario.
//!
//! Funciones puras: misma entrada, misma salida, sin efectos. Se hace en una
//! sola pasada, así que un valor que contenga `{{name}}` no se vuelve a expandir.

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::models::dispatch_model::Recipient;

/// Valor por defecto cuando el destinatario no trae nombre.
pub const NAME_FALLBACK: &str = "there";

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder regex is valid")
    })
}

/// Valor crudo (sin escapar) de un placeholder reconocido.
fn resolve<'a>(field: &str, recipient: &'a Recipient) -> Option<&'a str> {
    match field {
        "name" => Some(
            recipient
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .unwrap_or(NAME_FALLBACK),
        ),
        "email" => Some(recipient.email.as_str()),
        "type" => Some(recipient.kind.as_deref().unwrap_or("")),
        _ => None,
    }
}

fn render_with<F>(template: &str, recipient: &Recipient, encode: F) -> String
where
    F: Fn(&str) -> String,
{
    placeholder_re()
        .replace_all(template, |caps: &Captures| match resolve(&caps[1], recipient) {
            Some(value) => encode(value),
            // Placeholder desconocido: se deja tal cual
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Renderiza un cuerpo HTML. Todos los valores interpolados se escapan.
pub fn render_html(template: &str, recipient: &Recipient) -> String {
    render_with(template, recipient, escape_html)
}

/// Renderiza texto plano (asuntos). No escapa HTML, pero colapsa saltos de
/// línea para que un campo del destinatario no pueda inyectar cabeceras.
pub fn render_text(template: &str, recipient: &Recipient) -> String {
    render_with(template, recipient, |v| v.replace(['\r', '\n'], " "))
}

pub fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            other => out.push(other),
        }
    }
    out
}

//! # Formulario de Credenciales
//! src/credentials/form.rs
//!
//! Extrae usuario y contraseña del cuerpo que envían las páginas de login
//! y registro: `user=<nombre>&password=<clave>`. Solo se acepta esa forma
//! exacta; no es un decodificador general de formularios.

use thiserror::Error;

/// Longitud máxima de cada campo, en bytes
pub const MAX_FIELD_LEN: usize = 100;

const USER_LABEL: &str = "user=";
const PASSWORD_LABEL: &str = "password=";

/// Par usuario/contraseña en texto plano
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub name: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("name", &self.name)
            .field("password", &"***")
            .finish()
    }
}

/// Errores del formulario
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("form body is not valid UTF-8")]
    InvalidUtf8,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),

    #[error("field `{0}` exceeds {} bytes", MAX_FIELD_LEN)]
    FieldTooLong(&'static str),
}

/// Parsea `user=<nombre>&password=<clave>`
///
/// # Ejemplo
/// ```
/// use reactor_httpd::credentials::form::parse_credentials;
///
/// let creds = parse_credentials(b"user=ana&password=s3cret").unwrap();
/// assert_eq!(creds.name, "ana");
/// assert_eq!(creds.password, "s3cret");
/// ```
pub fn parse_credentials(body: &[u8]) -> Result<Credentials, FormError> {
    let body = std::str::from_utf8(body).map_err(|_| FormError::InvalidUtf8)?;

    let (user_part, password_part) = body
        .split_once('&')
        .ok_or(FormError::MissingField("password"))?;

    let name = user_part
        .strip_prefix(USER_LABEL)
        .ok_or(FormError::MissingField("user"))?;
    let password = password_part
        .strip_prefix(PASSWORD_LABEL)
        .ok_or(FormError::MissingField("password"))?;

    Ok(Credentials {
        name: check_field("user", name)?.to_string(),
        password: check_field("password", password)?.to_string(),
    })
}

fn check_field<'a>(field: &'static str, value: &'a str) -> Result<&'a str, FormError> {
    if value.is_empty() {
        return Err(FormError::EmptyField(field));
    }
    if value.len() > MAX_FIELD_LEN {
        return Err(FormError::FieldTooLong(field));
    }
    Ok(value)
}

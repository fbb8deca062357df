use anyhow::{Result, bail};

use macrolog_core::auth::hash_password;
use macrolog_core::models::validate_credentials;
use macrolog_core::service::MacroService;

pub(crate) fn cmd_user_add(
    svc: &MacroService,
    username: &str,
    password: &str,
    json: bool,
) -> Result<()> {
    let username = validate_credentials(username, password)?;
    let hash = hash_password(password)?;
    let Some(user) = svc.create_user(&username, &hash)? else {
        bail!("User '{username}' already exists");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&user)?);
    } else {
        let id = user.id;
        println!("Created user {username} (id {id})");
    }
    Ok(())
}

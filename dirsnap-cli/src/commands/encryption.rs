//! `dirsnap encryption enable|disable`

use crate::cli::EncryptionCommands;
use crate::context::Context;
use crate::output;
use dirsnap_core::encrypt::encryptor_for;

pub fn run(ctx: &Context, command: EncryptionCommands) -> anyhow::Result<()> {
    let mut configuration = ctx.load_configuration()?;

    match command {
        EncryptionCommands::Enable { recipient, method } => {
            let encryptor = encryptor_for(&method)?;
            let key_info = configuration.set_encryption(encryptor.as_ref(), &recipient)?;
            ctx.save_configuration(&configuration)?;
            output::success(&format!("Archives will be encrypted for {}", recipient.trim()));
            for line in key_info.lines().filter(|l| !l.trim().is_empty()) {
                output::dim(line);
            }
        }
        EncryptionCommands::Disable => {
            if configuration.clear_encryption() {
                ctx.save_configuration(&configuration)?;
                output::success("Encryption disabled");
            } else {
                output::info("Encryption was not enabled");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::sandbox;
    use crate::error::{exit_code, EXIT_CONFIGURATION};
    use dirsnap_core::models::EncryptionSettings;
    use dirsnap_core::{store, BackupConfiguration};

    #[test]
    fn test_disable_clears_settings() {
        let sb = sandbox();
        let cfg = BackupConfiguration {
            encryption: Some(EncryptionSettings {
                method: "gpg".into(),
                receiver: "me@example.com".into(),
                passphrase: None,
            }),
            ..BackupConfiguration::default()
        };
        sb.ctx.save_configuration(&cfg).unwrap();

        run(&sb.ctx, EncryptionCommands::Disable).unwrap();

        assert!(store::load(&sb.ctx.config_path()).unwrap().encryption.is_none());
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let sb = sandbox();
        sb.ctx.save_configuration(&BackupConfiguration::default()).unwrap();

        let err = run(
            &sb.ctx,
            EncryptionCommands::Enable {
                recipient: "me@example.com".into(),
                method: "rot13".into(),
            },
        )
        .unwrap_err();

        assert_eq!(exit_code(&err), EXIT_CONFIGURATION);
        assert!(store::load(&sb.ctx.config_path()).unwrap().encryption.is_none());
    }
}

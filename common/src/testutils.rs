use std::os::unix::fs::PermissionsExt;

pub async fn create_temp_dir() -> anyhow::Result<std::path::PathBuf> {
    let mut idx = 0;
    loop {
        let tmp_dir = std::env::temp_dir().join(format!("upmerge_test{}", &idx));
        if let Err(error) = tokio::fs::create_dir(&tmp_dir).await {
            match error.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    idx += 1;
                }
                _ => return Err(error.into()),
            }
        } else {
            return Ok(tmp_dir);
        }
    }
}

pub const HOSTS: &str = "127.0.0.1 localhost\n10.0.0.5 build\n";
pub const SUDO: &str = "auth sufficient pam_tid.so\n";
pub const SSHD_CONFIG: &str = "PermitRootLogin no\n";
pub const SSHD_CONFIG_SWAP: &str = "PermitRootLogin yes\n";

pub async fn setup_test_dir() -> anyhow::Result<std::path::PathBuf> {
    // create a temporary directory holding only the override tree, tests add "etc" as needed
    let tmp_dir = create_temp_dir().await?;
    // overrides
    // |- hosts
    // |- pam.d
    //    |- sudo          (mode 0600)
    // |- ssh
    //    |- sshd_config
    //    |- sshd_config~  <- editor leftover
    let overrides = tmp_dir.join("overrides");
    tokio::fs::create_dir(&overrides).await?;
    tokio::fs::write(overrides.join("hosts"), HOSTS).await?;
    let pam_path = overrides.join("pam.d");
    tokio::fs::create_dir(&pam_path).await?;
    tokio::fs::write(pam_path.join("sudo"), SUDO).await?;
    tokio::fs::set_permissions(
        pam_path.join("sudo"),
        std::fs::Permissions::from_mode(0o600),
    )
    .await?;
    let ssh_path = overrides.join("ssh");
    tokio::fs::create_dir(&ssh_path).await?;
    tokio::fs::write(ssh_path.join("sshd_config"), SSHD_CONFIG).await?;
    tokio::fs::write(ssh_path.join("sshd_config~"), SSHD_CONFIG_SWAP).await?;
    Ok(tmp_dir)
}

pub async fn read(path: &std::path::Path) -> anyhow::Result<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

//! Permission sets attached to provisioned accounts

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Operations a session may perform inside its home directory
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        /// Change directory (CWD, CDUP)
        const CHANGE_DIR = 1 << 0;
        /// List directory contents (LIST, NLST)
        const LIST = 1 << 1;
        /// Download files (RETR)
        const READ = 1 << 2;
        /// Append to files (APPE)
        const APPEND = 1 << 3;
        /// Delete files and directories (DELE, RMD)
        const DELETE = 1 << 4;
        /// Rename files and directories (RNFR, RNTO)
        const RENAME = 1 << 5;
        /// Create directories (MKD)
        const MKDIR = 1 << 6;
        /// Upload files (STOR)
        const WRITE = 1 << 7;
        /// Change file mode
        const CHMOD = 1 << 8;

        const READ_ONLY = Self::CHANGE_DIR.bits() | Self::LIST.bits() | Self::READ.bits();
        const FULL = Self::READ_ONLY.bits()
            | Self::APPEND.bits()
            | Self::DELETE.bits()
            | Self::RENAME.bits()
            | Self::MKDIR.bits()
            | Self::WRITE.bits()
            | Self::CHMOD.bits();
    }
}

const CODES: [(Permissions, char); 9] = [
    (Permissions::CHANGE_DIR, 'e'),
    (Permissions::LIST, 'l'),
    (Permissions::READ, 'r'),
    (Permissions::APPEND, 'a'),
    (Permissions::DELETE, 'd'),
    (Permissions::RENAME, 'f'),
    (Permissions::MKDIR, 'm'),
    (Permissions::WRITE, 'w'),
    (Permissions::CHMOD, 'M'),
];

/// Compact letter form, e.g. `elr` for read-only
impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (flag, code) in CODES {
            if self.contains(flag) {
                write!(f, "{}", code)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_cannot_modify() {
        let perms = Permissions::READ_ONLY;
        assert!(perms.contains(Permissions::READ | Permissions::LIST));
        assert!(!perms.intersects(Permissions::WRITE | Permissions::DELETE | Permissions::MKDIR));
        assert_eq!(perms.to_string(), "elr");
    }

    #[test]
    fn full_grants_everything() {
        assert_eq!(Permissions::FULL, Permissions::all());
        assert_eq!(Permissions::FULL.to_string(), "elradfmwM");
    }
}

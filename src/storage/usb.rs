use std::path::PathBuf;

#[cfg(not(target_os = "windows"))]
use anyhow::bail;

/// Finds where a removable drive with the given volume label is mounted.
#[cfg(not(target_os = "windows"))]
pub fn find_mount_by_label(label: &str) -> anyhow::Result<PathBuf> {
    let mounts = std::fs::read_to_string("/proc/self/mounts")?;
    match find_in_mounts(&mounts, label) {
        Some(mount) => Ok(mount),
        None => bail!("device '{label}' not mounted"),
    }
}

/// Looks a label up in `/proc/self/mounts` contents.
///
/// Mount points named exactly like the label win over ones merely containing it.
#[cfg(not(target_os = "windows"))]
fn find_in_mounts(mounts: &str, label: &str) -> Option<PathBuf> {
    let mount_points = mounts
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        // spaces in mount points are octal-escaped
        .map(|p| PathBuf::from(p.replace("\\040", " ")))
        .collect::<Vec<_>>();

    let exact = mount_points.iter().find(|p| {
        p.file_name()
            .map(|name| name.to_string_lossy() == label)
            .unwrap_or(false)
    });

    exact
        .or_else(|| {
            mount_points
                .iter()
                .find(|p| p.to_string_lossy().contains(label))
        })
        .cloned()
}

#[cfg(all(test, not(target_os = "windows")))]
mod tests {
    use std::path::PathBuf;

    use super::find_in_mounts;

    const MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
/dev/sdb1 /media/user/WALKMAN-BACKUP vfat rw 0 0
/dev/sdc1 /media/user/WALKMAN vfat rw 0 0
/dev/sdd1 /media/user/MY\\040IPOD vfat rw 0 0
";

    #[test]
    fn exact_label_wins() {
        assert_eq!(
            find_in_mounts(MOUNTS, "WALKMAN"),
            Some(PathBuf::from("/media/user/WALKMAN"))
        );
    }

    #[test]
    fn escaped_spaces_and_missing_labels() {
        assert_eq!(
            find_in_mounts(MOUNTS, "MY IPOD"),
            Some(PathBuf::from("/media/user/MY IPOD"))
        );
        assert_eq!(find_in_mounts(MOUNTS, "ZUNE"), None);
    }
}

#[cfg(target_os = "windows")]
pub fn find_mount_by_label(label: &str) -> anyhow::Result<PathBuf> {
    for_windows::find_mount_by_label(label)
}

#[cfg(target_os = "windows")]
mod for_windows {
    use std::{
        ffi::OsString,
        os::windows::ffi::{OsStrExt, OsStringExt},
        path::PathBuf,
    };

    use anyhow::bail;
    use windows::{
        Win32::{
            Foundation::MAX_PATH,
            Storage::FileSystem::{GetLogicalDriveStringsW, GetVolumeInformationW},
        },
        core::PCWSTR,
    };

    /// A mounted drive letter and its volume label
    #[derive(Debug)]
    struct Volume {
        root: PathBuf,
        label: String,
    }

    /// FAT volume labels are stored upper-cased, so compare without case
    pub(super) fn find_mount_by_label(label: &str) -> anyhow::Result<PathBuf> {
        match volumes()?
            .into_iter()
            .find(|v| v.label.eq_ignore_ascii_case(label))
        {
            Some(volume) => Ok(volume.root),
            None => bail!("device '{label}' not mounted"),
        }
    }

    /// Splits the NUL-separated list filled in by `GetLogicalDriveStringsW`
    fn split_drive_strings(buffer: &[u16]) -> Vec<String> {
        buffer
            .split(|&c| c == 0)
            .filter(|s| !s.is_empty())
            .map(|s| OsString::from_wide(s).to_string_lossy().to_string())
            .collect()
    }

    fn volume_label(root: &str) -> Option<String> {
        let mut name = [0u16; MAX_PATH as usize + 1];
        let wide = OsString::from(root)
            .encode_wide()
            .chain(Some(0))
            .collect::<Vec<u16>>();

        let ok = unsafe {
            GetVolumeInformationW(
                PCWSTR(wide.as_ptr()),
                Some(&mut name),
                None,
                None,
                None,
                None,
            )
        };
        ok.ok()?;
        let label = split_drive_strings(&name).into_iter().next().unwrap_or_default();
        Some(label)
    }

    fn volumes() -> anyhow::Result<Vec<Volume>> {
        let mut buffer = [0u16; 256];
        let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) } as usize;
        if len == 0 || len > buffer.len() {
            bail!("cannot list logical drives");
        }

        Ok(split_drive_strings(&buffer[..len])
            .into_iter()
            .filter_map(|root| {
                // drives without media, e.g. empty card readers, have no label
                let label = volume_label(&root)?;
                Some(Volume {
                    root: PathBuf::from(root),
                    label,
                })
            })
            .collect())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn splits_drive_list() {
            let raw = "C:\\\0E:\\\0\0".encode_utf16().collect::<Vec<_>>();
            assert_eq!(split_drive_strings(&raw), vec!["C:\\", "E:\\"]);
        }
    }
}

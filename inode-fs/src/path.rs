//! 路径解析
//!
//! 以 `/` 开头的是绝对路径，从根目录出发；否则从调用者给出的工作目录出发。
//! 连续的与末尾的分隔符都被忽略。

use crate::Dir;

/// 拆成目录部分与最后一个分量，如 `"/a/b/"` 拆成 `("/a", "b")`，
/// `"/"` 拆成 `("/", "")`，`"a"` 拆成 `("", "a")`
pub(crate) fn split_path(path: &str) -> (&str, &str) {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        let dir = if path.starts_with('/') { "/" } else { "" };
        return (dir, "");
    }

    match trimmed.rfind('/') {
        Some(0) => ("/", &trimmed[1..]),
        Some(i) => (&trimmed[..i], &trimmed[i + 1..]),
        None => ("", trimmed),
    }
}

impl Dir {
    /// 解析出 `path` 所指的目录。
    ///
    /// 任一分量不存在或不是目录，或最终的目录已被删除时返回空。
    pub fn open_path(path: &str, cwd: &Dir) -> Option<Dir> {
        let mut dir = if path.starts_with('/') {
            Dir::open_root(cwd.inode().volume())?
        } else {
            cwd.reopen()
        };

        for name in path.split('/').filter(|name| !name.is_empty()) {
            dir = Dir::open(dir.lookup(name)?)?;
        }

        (!dir.inode().is_removed()).then_some(dir)
    }
}

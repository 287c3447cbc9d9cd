use alloc::sync::Arc;

use vfs::Error;

use crate::Inode;

/// 打开的普通文件：共享的 inode 加上自己的读写位置
pub struct File {
    inode: Arc<Inode>,
    pos: usize,
    /// 本句柄是否调用过 [`Inode::deny_write`]
    deny_write: bool,
}

impl File {
    pub fn open(inode: Arc<Inode>) -> Self {
        Self {
            inode,
            pos: 0,
            deny_write: false,
        }
    }

    /// 共享同一 inode，读写位置从头开始
    pub fn reopen(&self) -> Self {
        Self::open(self.inode.reopen())
    }

    #[inline]
    pub fn inode(&self) -> &Arc<Inode> {
        &self.inode
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = self.inode.read_at(self.pos, buf);
        self.pos += n;
        n
    }

    pub fn write(&mut self, buf: &[u8]) -> usize {
        let n = self.inode.write_at(self.pos, buf);
        self.pos += n;
        n
    }

    /// 从当前位置写入全部数据
    pub fn write_all(&mut self, buf: &[u8]) -> Result<(), Error> {
        if self.inode.is_write_denied() {
            return Err(Error::WriteDenied);
        }
        if self.write(buf) == buf.len() {
            Ok(())
        } else {
            Err(Error::NoSpace)
        }
    }

    #[inline]
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        self.inode.read_at(offset, buf)
    }

    #[inline]
    pub fn write_at(&self, offset: usize, buf: &[u8]) -> usize {
        self.inode.write_at(offset, buf)
    }

    /// 可以越过文件末尾，之后的写入会先把文件增长到该位置
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inode.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inode.is_empty()
    }

    /// 禁止任何句柄写入该文件，直到本句柄允许或关闭
    pub fn deny_write(&mut self) {
        if !self.deny_write {
            self.deny_write = true;
            self.inode.deny_write();
        }
    }

    pub fn allow_write(&mut self) {
        if self.deny_write {
            self.deny_write = false;
            self.inode.allow_write();
        }
    }
}

impl Drop for File {
    fn drop(&mut self) {
        self.allow_write();
    }
}

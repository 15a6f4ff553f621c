/// 以整数号索引的资源表。
///
/// 槽位一经分配就不会移动；被销毁的号码压入回收栈，下一次分配优先取栈顶。
/// 因此同一时刻不会有两个存活资源共享一个号码，而号码总是小于历史上的最大存活数。
pub struct Registry<T> {
    slots: Vec<Option<T>>,
    free: Vec<usize>,
}

impl<T> Default for Registry<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Registry<T> {
    #[inline]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }

    /// 放入一个资源，返回它的号码。
    pub fn allocate(&mut self, value: T) -> usize {
        if let Some(id) = self.free.pop() {
            debug_assert!(self.slots[id].is_none());
            self.slots[id] = Some(value);
            id
        } else {
            self.slots.push(Some(value));
            self.slots.len() - 1
        }
    }

    /// 取出号码对应的资源并回收号码；号码越界或已空时返回 [`None`]。
    pub fn remove(&mut self, id: usize) -> Option<T> {
        let value = self.slots.get_mut(id)?.take()?;
        self.free.push(id);
        Some(value)
    }

    /// 释放号码对应的资源。越界或已空的号码什么都不做。
    #[inline]
    pub fn destroy(&mut self, id: usize) -> bool {
        self.remove(id).is_some()
    }

    #[inline]
    pub fn get(&self, id: usize) -> Option<&T> {
        self.slots.get(id)?.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.slots.get_mut(id)?.as_mut()
    }

    #[inline]
    pub fn contains(&self, id: usize) -> bool {
        self.get(id).is_some()
    }

    /// 存活资源数。
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 曾经分配过的槽位数。
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i, v)))
    }

    /// 按号码顺序取出所有存活资源，表被清空，号码从 0 重新开始。
    pub fn drain(&mut self) -> impl Iterator<Item = (usize, T)> + '_ {
        self.free.clear();
        self.slots
            .drain(..)
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|v| (i, v)))
    }

    /// 按号码顺序释放所有资源。
    #[inline]
    pub fn clear(&mut self) {
        self.drain().for_each(drop)
    }
}

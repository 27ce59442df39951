/// The three texture slots of a wallpaper tile.
///
/// A texture only ever moves `pending -> current -> previous`; each slot owns
/// its value outright so two slots can never alias the same texture.
#[derive(Debug)]
pub struct TextureSlots<T> {
    previous: Option<T>,
    current: Option<T>,
    pending: Option<T>,
}

impl<T> Default for TextureSlots<T> {
    fn default() -> Self {
        Self {
            previous: None,
            current: None,
            pending: None,
        }
    }
}

impl<T> TextureSlots<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&T> {
        self.previous.as_ref()
    }

    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Stores a freshly decoded texture, returning the one it displaced.
    pub fn set_pending(&mut self, texture: T) -> Option<T> {
        self.pending.replace(texture)
    }

    /// Rotates `pending` into `current` and `current` into `previous`.
    /// Does nothing when no pending texture exists.
    pub fn promote(&mut self) -> bool {
        let Some(next) = self.pending.take() else {
            return false;
        };
        self.previous = self.current.replace(next);
        true
    }

    /// Drops the faded-out texture.
    pub fn release_previous(&mut self) -> Option<T> {
        self.previous.take()
    }

    pub fn clear(&mut self) {
        self.previous = None;
        self.current = None;
        self.pending = None;
    }
}

use std::sync::Arc;

use crate::{RuntimeError, Thunk, Value};

/// One activation: a message handler, `JSR` subroutine or `PASS` target.
#[derive(Debug)]
pub struct Frame {
    /// Object table slot of the receiver.
    pub object: usize,
    /// Program whose code is executing (the receiver's class or an ancestor).
    pub thunk: Arc<Thunk>,
    pub message: u32,
    /// Arguments as received, in push order.
    pub args: Vec<Value>,
    /// Auto variables.
    pub autos: Vec<u8>,
    /// Value stack length on entry; cells below belong to the caller.
    pub stack_base: usize,
}

#[derive(Debug, Clone)]
pub struct ExecutionStateInfo {
    pub stack_size: usize,
    pub max_frames: usize,
    pub instruction_budget: Option<u64>,
}

impl Default for ExecutionStateInfo {
    fn default() -> Self {
        Self {
            stack_size: crate::VM_STACK_CELLS,
            max_frames: crate::MAX_CALL_DEPTH,
            instruction_budget: None,
        }
    }
}

/// Value stack and frame stack of one top-level dispatch. Nested sends,
/// subroutine calls and intrinsics re-entering the engine all share it.
#[derive(Debug)]
pub struct ExecutionState {
    stack: Vec<Value>,
    frames: Vec<Frame>,
    stack_size: usize,
    max_frames: usize,
    remaining: Option<u64>,
}

impl ExecutionState {
    #[must_use]
    pub fn new(info: &ExecutionStateInfo) -> Self {
        Self {
            stack: Vec::with_capacity(info.stack_size.min(1024)),
            frames: Vec::new(),
            stack_size: info.stack_size,
            max_frames: info.max_frames,
            remaining: info.instruction_budget,
        }
    }

    /// The whole value stack, bottom first.
    #[must_use]
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    #[must_use]
    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    fn base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.stack_base)
    }

    /// Cells owned by the current frame.
    #[must_use]
    pub fn frame_stack(&self) -> &[Value] {
        &self.stack[self.base()..]
    }

    pub fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.stack.len() >= self.stack_size {
            return Err(RuntimeError::StackOverflow { limit: self.stack_size });
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pop a cell of the current frame. `offset` is reported on underflow.
    pub fn pop(&mut self, offset: usize) -> Result<Value, RuntimeError> {
        if self.stack.len() <= self.base() {
            return Err(RuntimeError::StackUnderflow { offset });
        }
        self.stack.pop().ok_or(RuntimeError::StackUnderflow { offset })
    }

    /// The accumulator: top cell of the current frame.
    pub fn top(&self, offset: usize) -> Result<Value, RuntimeError> {
        self.nth(0, offset)
    }

    pub fn set_top(&mut self, value: Value, offset: usize) -> Result<(), RuntimeError> {
        self.set_nth(0, value, offset)
    }

    /// The nth cell from the top of the current frame (0-indexed).
    pub fn nth(&self, n: usize, offset: usize) -> Result<Value, RuntimeError> {
        let len = self.stack.len();
        if len < self.base() + n + 1 {
            return Err(RuntimeError::StackUnderflow { offset });
        }
        Ok(self.stack[len - 1 - n])
    }

    pub fn set_nth(&mut self, n: usize, value: Value, offset: usize) -> Result<(), RuntimeError> {
        let len = self.stack.len();
        if len < self.base() + n + 1 {
            return Err(RuntimeError::StackUnderflow { offset });
        }
        self.stack[len - 1 - n] = value;
        Ok(())
    }

    /// Remove the top `n` cells of the current frame, bottom first.
    pub fn pop_slice(&mut self, n: usize, offset: usize) -> Result<Vec<Value>, RuntimeError> {
        let len = self.stack.len();
        if len < self.base() + n {
            return Err(RuntimeError::StackUnderflow { offset });
        }
        Ok(self.stack.split_off(len - n))
    }

    /// Enter a frame and return its level.
    pub fn enter(&mut self, mut frame: Frame) -> Result<usize, RuntimeError> {
        if self.frames.len() >= self.max_frames {
            return Err(RuntimeError::FrameOverflow { depth: self.frames.len() + 1 });
        }
        frame.stack_base = self.stack.len();
        self.frames.push(frame);
        Ok(self.frames.len() - 1)
    }

    /// Unwind to just below frame `level`, discarding its cells.
    pub fn leave(&mut self, level: usize) {
        if let Some(frame) = self.frames.get(level) {
            self.stack.truncate(frame.stack_base);
        }
        self.frames.truncate(level);
    }

    /// Restore the value stack to `depth` cells and the frame stack to
    /// `frames` frames, used after a re-entrant intrinsic returns.
    pub fn restore(&mut self, depth: usize, frames: usize) {
        self.frames.truncate(frames);
        self.stack.truncate(depth);
    }

    #[must_use]
    pub fn frame(&self, level: usize) -> Option<&Frame> {
        self.frames.get(level)
    }

    pub fn frame_mut(&mut self, level: usize) -> Option<&mut Frame> {
        self.frames.get_mut(level)
    }

    #[must_use]
    pub fn current_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Count one instruction against the budget.
    #[inline]
    pub fn tick(&mut self) -> Result<(), RuntimeError> {
        match &mut self.remaining {
            Some(0) => Err(RuntimeError::BudgetExhausted),
            Some(n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(stack_size: usize) -> ExecutionState {
        ExecutionState::new(&ExecutionStateInfo {
            stack_size,
            max_frames: 4,
            instruction_budget: Some(2),
        })
    }

    #[test]
    fn push_pop_and_overflow() {
        let mut s = state(2);
        s.push(Value::from_i32(1)).unwrap();
        s.push(Value::from_i32(2)).unwrap();
        assert!(matches!(s.push(Value::ZERO), Err(RuntimeError::StackOverflow { limit: 2 })));
        assert_eq!(s.nth(1, 0).unwrap().as_i32(), 1);
        assert_eq!(s.pop(0).unwrap().as_i32(), 2);
        assert_eq!(s.top(0).unwrap().as_i32(), 1);
        s.set_top(Value::from_i32(9), 0).unwrap();
        assert_eq!(s.pop(0).unwrap().as_i32(), 9);
        assert!(matches!(s.pop(7), Err(RuntimeError::StackUnderflow { offset: 7 })));
    }

    #[test]
    fn pop_slice_keeps_push_order() {
        let mut s = state(8);
        for v in 1..=4 {
            s.push(Value::from_i32(v)).unwrap();
        }
        let args: Vec<i32> = s.pop_slice(3, 0).unwrap().iter().map(|v| v.as_i32()).collect();
        assert_eq!(args, vec![2, 3, 4]);
        assert_eq!(s.depth(), 1);
        assert!(s.pop_slice(2, 0).is_err());
    }

    #[test]
    fn budget_runs_out() {
        let mut s = state(1);
        s.tick().unwrap();
        s.tick().unwrap();
        assert!(matches!(s.tick(), Err(RuntimeError::BudgetExhausted)));
    }
}

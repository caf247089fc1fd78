#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::chunk::Chunk;
    use crate::thread::{RunThread, ThreadSlot};

    fn thread_over(bytes: Vec<u8>) -> RunThread {
        RunThread::new(Arc::new(Chunk::new(bytes)), Arc::new(ThreadSlot::default()))
    }

    #[test]
    fn stream_reads_advance_and_peeks_do_not() {
        let mut thread = thread_over(vec![10, 20, 30]);
        thread.init(0);

        assert_eq!(thread.now(), 10);
        assert_eq!(thread.now(), 10);
        assert_eq!(thread.next(), 10);
        assert_eq!(thread.next(), 20);
        assert_eq!(thread.now(), 30);
        assert_eq!(thread.ip, 2);
    }

    #[test]
    fn reads_past_the_end_yield_zero() {
        let mut thread = thread_over(vec![7]);
        thread.init(0);

        assert_eq!(thread.next(), 7);
        assert!(thread.at_eof());
        assert_eq!(thread.now(), 0);
        assert_eq!(thread.next(), 0);
        assert_eq!(thread.next(), 0);
        assert_eq!(thread.ip, 1);
    }

    #[test]
    fn multi_byte_reads_are_little_endian() {
        let mut thread = thread_over(vec![0x01, 0x02, 0xFE, 0xFF, 0xFF, 0xFF]);
        thread.init(0);

        assert_eq!(thread.read_u16(), 0x0201);
        assert_eq!(thread.read_i32(), -2);
    }

    #[test]
    fn init_pushes_the_bottom_frame_and_activates() {
        let mut thread = thread_over(vec![0; 8]);
        assert!(!thread.is_active());
        assert!(!thread.has_frames());

        thread.init(4);
        assert!(thread.is_active());
        assert!(thread.has_frames());
        assert_eq!(thread.ip, 4);
        assert_eq!(thread.top_frame().return_address(), 0);
        assert_eq!(thread.top_frame().return_reg().target(), None);
    }

    #[test]
    fn clean_up_is_idempotent() {
        let mut thread = thread_over(vec![0; 8]);
        thread.init(4);

        thread.clean_up();
        assert!(!thread.is_active());
        assert!(!thread.has_frames());
        assert_eq!(thread.ip, 0);

        // a second clean up changes nothing
        thread.clean_up();
        assert!(!thread.is_active());
    }

    #[test]
    fn slot_activity_is_visible_through_the_shared_handle() {
        let slot = Arc::new(ThreadSlot::default());
        let mut thread = RunThread::new(Arc::new(Chunk::new(vec![0; 4])), Arc::clone(&slot));

        assert!(!slot.is_active());
        thread.init(0);
        assert!(slot.is_active());
        thread.clean_up();
        assert!(!slot.is_active());
    }
}

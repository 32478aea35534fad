use crate::domain::Job;

/// Anything that can be scheduled by a numeric cost; lower runs sooner.
pub trait Weighted {
    fn weight(&self) -> u64;
}

impl Weighted for Job {
    fn weight(&self) -> u64 {
        self.weight
    }
}

/// Binary min-heap over a dense vector.
///
/// Equal weights come out in no particular order; there is no arrival-order
/// tie break.
#[derive(Debug)]
pub struct PriorityQueue<T> {
    heap: Vec<T>,
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self { heap: Vec::new() }
    }
}

impl<T: Weighted> PriorityQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, value: T) {
        self.heap.push(value);
        self.sift_up(self.heap.len() - 1);
    }

    pub fn dequeue(&mut self) -> Option<T> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let min = self.heap.pop();
        if !self.heap.is_empty() {
            self.sift_down(0);
        }
        min
    }

    pub fn peek(&self) -> Option<&T> {
        self.heap.first()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.heap[index].weight() >= self.heap[parent].weight() {
                break;
            }
            self.heap.swap(index, parent);
            index = parent;
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && self.heap[left].weight() < self.heap[smallest].weight() {
                smallest = left;
            }
            if right < len && self.heap[right].weight() < self.heap[smallest].weight() {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.heap.swap(index, smallest);
            index = smallest;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Cost(u64);

    impl Weighted for Cost {
        fn weight(&self) -> u64 {
            self.0
        }
    }

    impl<T: Weighted> PriorityQueue<T> {
        fn holds_heap_property(&self) -> bool {
            (1..self.heap.len()).all(|i| self.heap[(i - 1) / 2].weight() <= self.heap[i].weight())
        }
    }

    // Small deterministic generator so the interleavings are reproducible.
    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        *seed >> 33
    }

    #[test]
    fn dequeues_in_ascending_weight_order() {
        let mut queue = PriorityQueue::new();
        for w in [50, 3, 999_999, 9, 3, 0, 42, 7] {
            queue.enqueue(Cost(w));
        }
        let mut out = Vec::new();
        while let Some(Cost(w)) = queue.dequeue() {
            out.push(w);
        }
        assert_eq!(out, vec![0, 3, 3, 7, 9, 42, 50, 999_999]);
        assert!(queue.is_empty());
    }

    #[test]
    fn empty_queue_signals_none() {
        let mut queue: PriorityQueue<Cost> = PriorityQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.dequeue(), None);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn heap_property_survives_random_interleaving() {
        let mut seed = 0x5eed;
        let mut queue = PriorityQueue::new();
        let mut last_popped: Option<u64> = None;

        for _ in 0..2_000 {
            if lcg(&mut seed) % 3 == 0 {
                if let Some(Cost(w)) = queue.dequeue() {
                    // everything still queued must be >= what just left
                    if let Some(next) = queue.peek() {
                        assert!(next.0 >= w);
                    }
                    last_popped = Some(w);
                }
            } else {
                queue.enqueue(Cost(lcg(&mut seed) % 100));
            }
            assert!(queue.holds_heap_property());
        }

        let mut previous = 0;
        while let Some(Cost(w)) = queue.dequeue() {
            assert!(w >= previous);
            previous = w;
        }
        assert!(last_popped.is_some());
    }
}

pub mod tracked_item;

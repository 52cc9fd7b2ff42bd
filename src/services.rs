// interruptible widening sleep for polling loops
pub mod backoff;

// client side connection + version handshake
pub mod connection;

// UDP broadcast discovery of the master node
pub mod discovery;

// closed property-query boundary to the renderer subprocess
pub mod file_info;

// content addressing for files and buffers
pub mod hashing;

// authoritative job/frame table owned by the master
pub mod job_manager;

// http face of the master
pub mod master;

// job-local placement of foreign file paths
pub mod path_remap;

// severity/message capability for embedded vs headless use
pub mod reporting;

// artifact address templates
pub mod urls;

// slave poll loop
pub mod worker;

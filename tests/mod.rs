mod worker_tests;

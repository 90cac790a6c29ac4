mod helpers;
mod iterator_tests;
